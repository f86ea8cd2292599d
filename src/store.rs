//! Record Store
//!
//! One table: a fixed-slot backing file plus an in-memory pointer index.
//!
//! ## Responsibilities
//! - Scan the file on open and rebuild `encoded id → slot` pointers
//! - Append new records at the next free slot
//! - Read and overwrite records in place by slot offset
//! - Compact by rewriting into a temp file and renaming it over the table
//!
//! ## Concurrency
//! Every public method holds the store mutex for its whole duration,
//! `rewrite` included. Separate stores never share a lock.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::config::{ScanMode, StoreConfig, SyncStrategy, REWRITE_MARKER};
use crate::error::{Result, SimstorError};
use crate::slot::{self, SlotContent, SlotLayout};

/// A typed record: ID plus payload
#[derive(Debug, Clone, PartialEq)]
pub struct Record<I, V> {
    pub id: I,
    pub value: V,
}

impl<I, V> Record<I, V> {
    pub fn new(id: I, value: V) -> Self {
        Self { id, value }
    }
}

/// Mutable state guarded by the store mutex
struct StoreState {
    /// Backing file; None once the store is closed
    file: Option<File>,

    /// Encoded ID → slot index
    pointers: HashMap<String, u64>,

    /// Next unused slot index
    last_pointer: u64,
}

/// A single table backed by one slot file
pub struct RecordStore<I, V> {
    config: StoreConfig,
    layout: SlotLayout,
    path: PathBuf,
    id_codec: Box<dyn Codec<I>>,
    value_codec: Box<dyn Codec<V>>,
    state: Mutex<StoreState>,
}

impl<I, V> RecordStore<I, V> {
    /// Open or create the table described by `config`
    ///
    /// On open:
    /// 1. Re-check the config and create the directory if it doesn't exist
    /// 2. Remove compaction artifacts left by an interrupted rewrite
    /// 3. Open or create `{name}.simstor`
    /// 4. Scan it line by line to rebuild the pointer index
    pub fn open(
        config: StoreConfig,
        id_codec: impl Codec<I> + 'static,
        value_codec: impl Codec<V> + 'static,
    ) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.directory)?;
        remove_stale_artifacts(&config)?;

        let path = config.file_path();
        let layout = SlotLayout::new(config.slot_width());
        let file = open_table_file(&path)?;
        let (pointers, last_pointer) = scan_pointers(&config, &layout, &file)?;

        info!(
            table = %config.name,
            path = %path.display(),
            slots = last_pointer,
            records = pointers.len(),
            "opened table"
        );

        Ok(Self {
            config,
            layout,
            path,
            id_codec: Box::new(id_codec),
            value_codec: Box::new(value_codec),
            state: Mutex::new(StoreState {
                file: Some(file),
                pointers,
                last_pointer,
            }),
        })
    }

    /// Deferred `open`, for registry construction
    pub fn factory<IC, VC>(
        config: StoreConfig,
        id_codec: IC,
        value_codec: VC,
    ) -> impl FnOnce() -> Result<Self>
    where
        IC: Codec<I> + 'static,
        VC: Codec<V> + 'static,
    {
        move || Self::open(config, id_codec, value_codec)
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Append a new record in the next free slot
    ///
    /// Fails with `KeyExists` if the ID is already stored and with
    /// `SlotOverflow` if the encoded record does not fit a slot. The index
    /// entry is registered before the write and rolled back if it fails.
    pub fn insert(&self, record: &Record<I, V>) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let id = self.encode_id(&record.id)?;
        if state.pointers.contains_key(&id) {
            return Err(SimstorError::KeyExists(id));
        }
        let value = self.encode_value(&record.value)?;
        let bytes = self.layout.encode(&id, &value)?;

        let file = self.file_mut(&mut state.file)?;
        let pointer = state.last_pointer;
        let offset = self.layout.offset(pointer);

        state.pointers.insert(id.clone(), pointer);
        if let Err(e) = write_slot(file, offset, &bytes, self.config.sync_strategy) {
            state.pointers.remove(&id);
            if let Err(trunc) = file.set_len(offset) {
                warn!(table = %self.config.name, error = %trunc, "could not trim failed append");
            }
            return Err(e.into());
        }
        state.last_pointer += 1;

        debug!(table = %self.config.name, id = %id, slot = pointer, "inserted");
        Ok(())
    }

    /// Read the record stored under `id`
    pub fn read(&self, id: &I) -> Result<Record<I, V>> {
        let key = self.encode_id(id)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let pointer = *state
            .pointers
            .get(&key)
            .ok_or_else(|| SimstorError::KeyNotFound(key.clone()))?;
        let file = self.file_mut(&mut state.file)?;
        let (stored_id, stored_value) = self.read_slot(file, pointer, &key)?;

        Ok(Record {
            id: self.decode_id(&stored_id)?,
            value: self.decode_value(&stored_value)?,
        })
    }

    /// Overwrite an existing record in place
    ///
    /// The slot keeps its index; the cursor does not move. Fails with
    /// `SlotOverflow` if the new value no longer fits the fixed slot width.
    pub fn update(&self, record: &Record<I, V>) -> Result<()> {
        let key = self.encode_id(&record.id)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let pointer = *state
            .pointers
            .get(&key)
            .ok_or_else(|| SimstorError::KeyNotFound(key.clone()))?;
        let file = self.file_mut(&mut state.file)?;

        // The stored ID is the canonical one for this slot
        let (stored_id, _) = self.read_slot(file, pointer, &key)?;
        let value = self.encode_value(&record.value)?;
        let bytes = self.layout.encode(&stored_id, &value)?;

        write_slot(file, self.layout.offset(pointer), &bytes, self.config.sync_strategy)?;

        debug!(table = %self.config.name, id = %key, slot = pointer, "updated");
        Ok(())
    }

    /// Replace the whole table with `records`
    ///
    /// Records whose ID is already stored keep their slot; new IDs get
    /// sequential slots starting at the current cursor. An ID repeated in
    /// `records` keeps one slot and the last value. Unused slots are written
    /// as vacant so slot index and line number stay equal.
    ///
    /// The new file is built next to the table and renamed over it only
    /// after every record was written. On any failure the temp file is
    /// removed and the previous contents stay readable.
    pub fn rewrite(&self, records: &[Record<I, V>]) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        self.file_mut(&mut state.file)?;

        let temp_path = self.temp_path();
        let built = self.build_rewrite(&temp_path, &state.pointers, state.last_pointer, records);
        let (pointers, last_pointer) = match built {
            Ok(result) => result,
            Err(e) => {
                discard_temp(&temp_path);
                return Err(e);
            }
        };

        // Release the old handle before replacing the file it points to
        drop(state.file.take());

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            discard_temp(&temp_path);
            state.file = Some(open_table_file(&self.path)?);
            return Err(e.into());
        }
        sync_directory(&self.config.directory);

        let record_count = pointers.len();
        state.pointers = pointers;
        state.last_pointer = last_pointer;
        state.file = Some(open_table_file(&self.path)?);

        info!(
            table = %self.config.name,
            records = record_count,
            slots = last_pointer,
            "rewrite complete"
        );
        Ok(())
    }

    /// Snapshot of every stored encoded ID, in no particular order
    pub fn list_ids(&self) -> Vec<String> {
        self.state.lock().pointers.keys().cloned().collect()
    }

    /// Decode every record in the file, in slot order
    ///
    /// Vacant slots and slots shadowed by an earlier copy of the same ID are
    /// skipped. Slots that fail to parse or decode are skipped with a warning
    /// in `ScanMode::Lenient` and abort the scan in `ScanMode::Strict`.
    pub fn read_all(&self) -> Result<Vec<Record<I, V>>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let file = self.file_mut(&mut state.file)?;
        file.seek(SeekFrom::Start(0))?;

        let mut reader = BufReader::new(&*file);
        let mut line = Vec::with_capacity(self.layout.width() as usize);
        let mut records = Vec::with_capacity(state.pointers.len());
        let mut slot_index = 0u64;
        let mut skipped = 0usize;

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            let current = slot_index;
            slot_index += 1;

            match self.decode_line(current, &line, &state.pointers) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) if self.config.scan_mode == ScanMode::Lenient => {
                    warn!(table = %self.config.name, slot = current, error = %e, "skipping unreadable slot");
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            table = %self.config.name,
            records = records.len(),
            skipped,
            "read all records"
        );
        Ok(records)
    }

    /// Flush and release the backing file
    ///
    /// Later operations fail with `StoreClosed`. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(file) = state.file.take() {
            file.sync_all()?;
            info!(table = %self.config.name, "closed table");
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Table name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Path of the active table file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Slot width in bytes
    pub fn slot_width(&self) -> u64 {
        self.layout.width()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.state.lock().pointers.len()
    }

    /// Whether the table holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a record with this ID is stored
    pub fn contains(&self, id: &I) -> Result<bool> {
        let key = self.encode_id(id)?;
        Ok(self.state.lock().pointers.contains_key(&key))
    }

    /// Slot index the next insert will use
    pub fn next_slot(&self) -> u64 {
        self.state.lock().last_pointer
    }

    /// Table configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn file_mut<'a>(&self, file: &'a mut Option<File>) -> Result<&'a mut File> {
        file.as_mut()
            .ok_or_else(|| SimstorError::StoreClosed(self.config.name.clone()))
    }

    fn encode_id(&self, id: &I) -> Result<String> {
        let text = self
            .id_codec
            .encode(id)
            .map_err(|e| self.encode_error(e.to_string()))?;
        slot::check_id(&text).map_err(|reason| self.encode_error(reason))?;
        Ok(text)
    }

    fn encode_value(&self, value: &V) -> Result<String> {
        let text = self
            .value_codec
            .encode(value)
            .map_err(|e| self.encode_error(e.to_string()))?;
        slot::check_value(&text).map_err(|reason| self.encode_error(reason))?;
        Ok(text)
    }

    fn decode_id(&self, text: &str) -> Result<I> {
        self.id_codec
            .decode(text)
            .map_err(|e| self.decode_error(e.to_string()))
    }

    fn decode_value(&self, text: &str) -> Result<V> {
        self.value_codec
            .decode(text)
            .map_err(|e| self.decode_error(e.to_string()))
    }

    fn encode_error(&self, reason: String) -> SimstorError {
        SimstorError::Encode {
            table: self.config.name.clone(),
            reason,
        }
    }

    fn decode_error(&self, reason: String) -> SimstorError {
        SimstorError::Decode {
            table: self.config.name.clone(),
            reason,
        }
    }

    /// Read one slot and return its encoded `(id, value)`
    ///
    /// The stored ID must equal `expected`; anything else means the index
    /// and the file disagree.
    fn read_slot(&self, file: &mut File, pointer: u64, expected: &str) -> Result<(String, String)> {
        let mut buffer = vec![0u8; self.layout.width() as usize - 1];
        file.seek(SeekFrom::Start(self.layout.offset(pointer)))?;
        file.read_exact(&mut buffer).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => SimstorError::MalformedRecord {
                slot: pointer,
                reason: "slot lies past the end of the file".to_string(),
            },
            _ => SimstorError::Io(e),
        })?;

        match self.layout.decode(pointer, &buffer)? {
            SlotContent::Record { id, value } if id == expected => Ok((id, value)),
            SlotContent::Record { id, .. } => Err(SimstorError::MalformedRecord {
                slot: pointer,
                reason: format!("expected id '{}', found '{}'", expected, id),
            }),
            SlotContent::Vacant => Err(SimstorError::MalformedRecord {
                slot: pointer,
                reason: format!("slot for id '{}' is vacant", expected),
            }),
        }
    }

    /// Decode one scanned line into a record, None for vacant or shadowed slots
    fn decode_line(
        &self,
        slot_index: u64,
        line: &[u8],
        pointers: &HashMap<String, u64>,
    ) -> Result<Option<Record<I, V>>> {
        match self.layout.decode(slot_index, line)? {
            SlotContent::Vacant => Ok(None),
            SlotContent::Record { id, value } => {
                if pointers.get(&id) != Some(&slot_index) {
                    debug!(table = %self.config.name, slot = slot_index, id = %id, "skipping shadowed slot");
                    return Ok(None);
                }
                Ok(Some(Record {
                    id: self.decode_id(&id)?,
                    value: self.decode_value(&value)?,
                }))
            }
        }
    }

    /// Compaction artifact path: `{name}-rewrite-at-{hex unix secs}.simstor`
    fn temp_path(&self) -> PathBuf {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.config
            .directory
            .join(format!("{}{:x}.simstor", artifact_prefix(&self.config.name), secs))
    }

    /// Write the rewrite output to `temp_path`, returning the new index and cursor
    fn build_rewrite(
        &self,
        temp_path: &Path,
        current: &HashMap<String, u64>,
        last_pointer: u64,
        records: &[Record<I, V>],
    ) -> Result<(HashMap<String, u64>, u64)> {
        let mut pointers: HashMap<String, u64> = HashMap::with_capacity(records.len());
        let mut slots: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
        let mut next_free = last_pointer;

        for record in records {
            let id = self.encode_id(&record.id)?;
            let value = self.encode_value(&record.value)?;
            let bytes = self.layout.encode(&id, &value)?;

            let pointer = match pointers.get(&id).or_else(|| current.get(&id)) {
                Some(&pointer) => pointer,
                None => {
                    next_free += 1;
                    next_free - 1
                }
            };
            pointers.insert(id, pointer);
            slots.insert(pointer, bytes);
        }

        let slot_count = slots.keys().next_back().map_or(0, |&last| last + 1);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)?;
        let mut writer = BufWriter::new(file);
        let vacant = self.layout.vacant();
        for index in 0..slot_count {
            let bytes = slots.get(&index).unwrap_or(&vacant);
            writer.write_all(bytes)?;
        }
        writer.flush()?;

        let file = writer.into_inner().map_err(|e| SimstorError::Io(e.into_error()))?;
        file.sync_all()?;

        Ok((pointers, slot_count))
    }
}

// =============================================================================
// File Helpers
// =============================================================================

fn open_table_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

fn write_slot(file: &mut File, offset: u64, bytes: &[u8], sync: SyncStrategy) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    if sync == SyncStrategy::EveryWrite {
        file.sync_data()?;
    }
    Ok(())
}

fn artifact_prefix(name: &str) -> String {
    format!("{}{}", name, REWRITE_MARKER)
}

/// Whether `file_name` is a rewrite artifact of table `name`
///
/// Matches only what `temp_path` produces: the prefix, lowercase hex, `.simstor`.
fn is_artifact_name(name: &str, file_name: &str) -> bool {
    file_name
        .strip_prefix(&artifact_prefix(name))
        .and_then(|rest| rest.strip_suffix(".simstor"))
        .map_or(false, |stamp| {
            !stamp.is_empty() && stamp.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        })
}

/// Best-effort removal of a failed rewrite's output
fn discard_temp(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove rewrite artifact");
        }
    }
}

/// Persist the rename in the directory entry
#[cfg(unix)]
fn sync_directory(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        warn!(path = %dir.display(), error = %e, "could not sync directory after rename");
    }
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) {}

/// Delete `{name}-rewrite-at-*.simstor` files left by an interrupted rewrite
fn remove_stale_artifacts(config: &StoreConfig) -> Result<()> {
    for entry in fs::read_dir(&config.directory)? {
        let path = entry?.path();
        let is_artifact = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| is_artifact_name(&config.name, n));

        if is_artifact && path.is_file() {
            warn!(table = %config.name, path = %path.display(), "removing stale rewrite artifact");
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Rebuild the pointer index by scanning the file line by line
///
/// Returns the index and the number of slots (the next free slot).
fn scan_pointers(
    config: &StoreConfig,
    layout: &SlotLayout,
    file: &File,
) -> Result<(HashMap<String, u64>, u64)> {
    let mut pointers = HashMap::new();
    let mut reader = BufReader::new(file);
    let mut line = Vec::with_capacity(layout.width() as usize);
    let mut slot_index = 0u64;
    let mut valid_len = 0u64;
    let mut torn_tail = false;

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }

        if line.last() != Some(&b'\n') {
            if config.scan_mode == ScanMode::Strict {
                return Err(SimstorError::MalformedRecord {
                    slot: slot_index,
                    reason: format!("incomplete trailing slot of {} bytes", n),
                });
            }
            warn!(table = %config.name, slot = slot_index, bytes = n, "dropping incomplete trailing slot");
            torn_tail = true;
            break;
        }

        if n as u64 != layout.width() {
            if config.scan_mode == ScanMode::Strict {
                return Err(SimstorError::MalformedRecord {
                    slot: slot_index,
                    reason: format!("line is {} bytes, slot width is {}", n, layout.width()),
                });
            }
            warn!(
                table = %config.name,
                slot = slot_index,
                bytes = n,
                width = layout.width(),
                "line length does not match slot width"
            );
        }

        if let Some(id) = slot::scan_id(&line) {
            if pointers.contains_key(id) {
                warn!(table = %config.name, slot = slot_index, id = %id, "duplicate id, keeping first slot");
            } else {
                pointers.insert(id.to_string(), slot_index);
            }
        }

        slot_index += 1;
        valid_len += n as u64;
    }

    if torn_tail {
        file.set_len(valid_len)?;
    }

    Ok((pointers, slot_index))
}

#[cfg(test)]
impl<I, V> RecordStore<I, V> {
    /// Replace the open handle, for exercising I/O failure paths
    pub(crate) fn swap_file(&self, file: File) {
        self.state.lock().file = Some(file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StringCodec;
    use tempfile::TempDir;

    fn open_store(dir: &Path) -> RecordStore<String, String> {
        let config = StoreConfig::builder("t").directory(dir).build().unwrap();
        RecordStore::open(config, StringCodec, StringCodec).unwrap()
    }

    #[test]
    fn test_artifact_names() {
        assert!(is_artifact_name("t", "t-rewrite-at-65f1a2b3.simstor"));
        assert!(!is_artifact_name("t", "t-rewrite-at-.simstor"));
        assert!(!is_artifact_name("t", "t-rewrite-at-notes.simstor"));
        assert!(!is_artifact_name("t", "t-rewrite-at-65F1.simstor"));
        assert!(!is_artifact_name("t", "t.simstor"));
        assert!(!is_artifact_name("t", "tt-rewrite-at-1.simstor"));
    }

    #[test]
    fn test_insert_write_failure_rolls_back_pointer() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(temp_dir.path());
        store
            .insert(&Record::new("a".to_string(), "1".to_string()))
            .unwrap();

        // Swap in a read-only handle so the next append fails
        store.swap_file(File::open(store.path()).unwrap());

        let result = store.insert(&Record::new("b".to_string(), "2".to_string()));

        assert!(matches!(result, Err(SimstorError::Io(_))));
        assert!(!store.contains(&"b".to_string()).unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(store.next_slot(), 1);
        assert_eq!(store.read(&"a".to_string()).unwrap().value, "1");
    }

    #[test]
    fn test_open_rejects_unvalidated_config() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = StoreConfig::builder("t").directory(temp_dir.path()).build().unwrap();
        config.increment = u64::MAX;

        let result = RecordStore::<String, String>::open(config, StringCodec, StringCodec);

        assert!(matches!(result, Err(SimstorError::Config(_))));
    }
}
