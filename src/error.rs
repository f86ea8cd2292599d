//! Error types for simstor
//!
//! Provides a unified error type for all store and registry operations.

use thiserror::Error;

/// Result type alias using SimstorError
pub type Result<T> = std::result::Result<T, SimstorError>;

/// Unified error type for simstor operations
#[derive(Debug, Error)]
pub enum SimstorError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Key already exists: {0}")]
    KeyExists(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Slot overflow: record needs {needed} bytes, slot holds {available}")]
    SlotOverflow { needed: usize, available: usize },

    #[error("Malformed record in slot {slot}: {reason}")]
    MalformedRecord { slot: u64, reason: String },

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Encode error in table '{table}': {reason}")]
    Encode { table: String, reason: String },

    #[error("Decode error in table '{table}': {reason}")]
    Decode { table: String, reason: String },

    // -------------------------------------------------------------------------
    // Registry Errors
    // -------------------------------------------------------------------------
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table registered twice: {0}")]
    DuplicateTable(String),

    #[error("Store is closed: {0}")]
    StoreClosed(String),

    #[error("Teardown failed for {} table(s)", .0.len())]
    Teardown(Vec<(String, SimstorError)>),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
