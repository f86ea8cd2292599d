//! Configuration for a simstor table
//!
//! Centralized per-table configuration with sensible defaults. The slot
//! width is fixed for the lifetime of a table file, so the builder checks
//! it against the largest record the caller declares up front.

use std::path::PathBuf;

use crate::error::{Result, SimstorError};
use crate::slot::SLOT_UNIT;

/// Largest accepted slot width multiplier (slots of about 65 MB)
pub const MAX_INCREMENT: u64 = 65_536;

/// Infix of compaction artifact file names; not allowed in table names
pub(crate) const REWRITE_MARKER: &str = "-rewrite-at-";

/// Configuration for one table (one backing file)
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------
    /// Table name; the backing file is `{directory}/{name}.simstor`
    pub name: String,

    /// Directory holding the table file and its compaction artifacts
    pub directory: PathBuf,

    // -------------------------------------------------------------------------
    // Slot Layout
    // -------------------------------------------------------------------------
    /// Slot width multiplier: `slot_width = increment * 1000` bytes
    pub increment: u64,

    /// Largest encoded `id=value` line the application expects to store
    pub max_record_len: Option<usize>,

    // -------------------------------------------------------------------------
    // Durability / Scanning
    // -------------------------------------------------------------------------
    /// When to fsync after in-place writes
    pub sync_strategy: SyncStrategy,

    /// How whole-file scans treat slots that fail to parse
    pub scan_mode: ScanMode,
}

/// Sync strategy for insert and update writes
///
/// Rewrite always syncs its temp file before promoting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Leave flushing to the OS page cache
    OsBuffered,

    /// fsync after every insert/update (safest, slowest)
    EveryWrite,
}

/// Treatment of unparseable slots during full-file scans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Skip the slot and emit a warning
    Lenient,

    /// Abort the scan with the slot's error
    Strict,
}

impl StoreConfig {
    /// Create a new config builder for the named table
    pub fn builder(name: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder {
            config: StoreConfig {
                name: name.into(),
                directory: PathBuf::from("./simstor_data"),
                increment: 1,
                max_record_len: None,
                sync_strategy: SyncStrategy::OsBuffered,
                scan_mode: ScanMode::Lenient,
            },
        }
    }

    /// Width of one slot in bytes
    pub fn slot_width(&self) -> u64 {
        self.increment * SLOT_UNIT
    }

    /// Longest `id=value` line a slot can hold (separator and newline excluded)
    pub fn max_line_len(&self) -> usize {
        self.slot_width() as usize - 2
    }

    /// Path of the active table file
    pub fn file_path(&self) -> PathBuf {
        self.directory.join(format!("{}.simstor", self.name))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SimstorError::Config("table name is empty".to_string()));
        }
        if self.name.contains(&['/', '\\'][..]) || self.name == "." || self.name == ".." {
            return Err(SimstorError::Config(format!(
                "table name '{}' must not contain path components",
                self.name
            )));
        }
        if self.name.contains(REWRITE_MARKER) {
            return Err(SimstorError::Config(format!(
                "table name '{}' must not contain '{}'",
                self.name, REWRITE_MARKER
            )));
        }
        if self.increment == 0 {
            return Err(SimstorError::Config(format!(
                "table '{}': slot increment must be at least 1",
                self.name
            )));
        }
        let width = self.increment.checked_mul(SLOT_UNIT);
        if self.increment > MAX_INCREMENT || width.map_or(true, |w| usize::try_from(w).is_err()) {
            return Err(SimstorError::Config(format!(
                "table '{}': slot increment {} exceeds the limit of {}",
                self.name, self.increment, MAX_INCREMENT
            )));
        }
        if let Some(max) = self.max_record_len {
            if max > self.max_line_len() {
                return Err(SimstorError::Config(format!(
                    "table '{}': max record length {} does not fit slot width {} (limit {})",
                    self.name,
                    max,
                    self.slot_width(),
                    self.max_line_len()
                )));
            }
        }
        Ok(())
    }
}

/// Builder for StoreConfig
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the directory holding the table file
    pub fn directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.directory = path.into();
        self
    }

    /// Set the slot width multiplier (slot width = increment * 1000 bytes)
    pub fn increment(mut self, increment: u64) -> Self {
        self.config.increment = increment;
        self
    }

    /// Declare the largest encoded record line the table must hold
    pub fn max_record_len(mut self, len: usize) -> Self {
        self.config.max_record_len = Some(len);
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the scan mode
    pub fn scan_mode(mut self, mode: ScanMode) -> Self {
        self.config.scan_mode = mode;
        self
    }

    /// Validate and return the config
    pub fn build(self) -> Result<StoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::builder("bagwords").build().unwrap();

        assert_eq!(config.slot_width(), 1000);
        assert_eq!(config.max_line_len(), 998);
        assert_eq!(config.sync_strategy, SyncStrategy::OsBuffered);
        assert_eq!(config.scan_mode, ScanMode::Lenient);
        assert!(config.file_path().ends_with("bagwords.simstor"));
    }

    #[test]
    fn test_rejects_zero_increment() {
        let result = StoreConfig::builder("t").increment(0).build();
        assert!(matches!(result, Err(SimstorError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_names() {
        assert!(StoreConfig::builder("").build().is_err());
        assert!(StoreConfig::builder("  ").build().is_err());
        assert!(StoreConfig::builder("a/b").build().is_err());
        assert!(StoreConfig::builder("..").build().is_err());
        assert!(StoreConfig::builder("a-rewrite-at-1").build().is_err());
    }

    #[test]
    fn test_rejects_oversized_increment() {
        let huge = StoreConfig::builder("t").increment(u64::MAX / 10).build();
        assert!(matches!(huge, Err(SimstorError::Config(_))));

        let over = StoreConfig::builder("t").increment(MAX_INCREMENT + 1).build();
        assert!(matches!(over, Err(SimstorError::Config(_))));

        let at_limit = StoreConfig::builder("t").increment(MAX_INCREMENT).build().unwrap();
        assert_eq!(at_limit.slot_width(), MAX_INCREMENT * SLOT_UNIT);
    }

    #[test]
    fn test_max_record_len_checked_against_slot_width() {
        assert!(StoreConfig::builder("t")
            .increment(3)
            .max_record_len(2998)
            .build()
            .is_ok());

        let result = StoreConfig::builder("t").increment(3).max_record_len(2999).build();
        assert!(matches!(result, Err(SimstorError::Config(_))));
    }
}
