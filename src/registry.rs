//! Store Registry
//!
//! Owns every table of an application and routes operations by table name.
//!
//! ## Responsibilities
//! - Open all tables at construction (all or nothing)
//! - Dispatch insert/read/update/rewrite/list by name
//! - Report `TableNotFound` for unknown names
//! - Close every table on teardown, collecting per-table failures

use std::collections::HashMap;

use tracing::{info, warn};

use crate::codec::Codec;
use crate::config::StoreConfig;
use crate::error::{Result, SimstorError};
use crate::store::{Record, RecordStore};

/// Deferred store construction, run once by the registry
pub type StoreFactory<I, V> = Box<dyn FnOnce() -> Result<RecordStore<I, V>> + Send>;

/// Name → store dispatcher
///
/// All tables share one `(I, V)` type pair. Each store has its own lock, so
/// operations on different tables never block each other.
pub struct StoreRegistry<I, V> {
    stores: HashMap<String, RecordStore<I, V>>,
}

impl<I, V> StoreRegistry<I, V> {
    /// Build a registry by running every factory in order
    ///
    /// The first failing factory aborts construction; tables opened before
    /// it are closed again and the factory's error is returned.
    pub fn new<F>(factories: impl IntoIterator<Item = F>) -> Result<Self>
    where
        F: FnOnce() -> Result<RecordStore<I, V>>,
    {
        let mut registry = Self {
            stores: HashMap::new(),
        };

        for factory in factories {
            let store = match factory() {
                Ok(store) => store,
                Err(e) => {
                    registry.abort_construction();
                    return Err(e);
                }
            };

            let name = store.name().to_string();
            if registry.stores.contains_key(&name) {
                if let Err(close_err) = store.close() {
                    warn!(table = %name, error = %close_err, "failed to close duplicate table");
                }
                registry.abort_construction();
                return Err(SimstorError::DuplicateTable(name));
            }
            registry.stores.insert(name, store);
        }

        info!(tables = registry.stores.len(), "registry ready");
        Ok(registry)
    }

    /// Open one table per config, all sharing the same codecs
    pub fn open<IC, VC>(
        configs: impl IntoIterator<Item = StoreConfig>,
        id_codec: IC,
        value_codec: VC,
    ) -> Result<Self>
    where
        IC: Codec<I> + Clone + 'static,
        VC: Codec<V> + Clone + 'static,
    {
        Self::new(configs.into_iter().map(|config| {
            RecordStore::<I, V>::factory(config, id_codec.clone(), value_codec.clone())
        }))
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Insert a new record into `table`
    pub fn insert(&self, table: &str, record: &Record<I, V>) -> Result<()> {
        self.table(table)?.insert(record)
    }

    /// Read a record from `table`
    pub fn read(&self, table: &str, id: &I) -> Result<Record<I, V>> {
        self.table(table)?.read(id)
    }

    /// Overwrite an existing record in `table`
    pub fn update(&self, table: &str, record: &Record<I, V>) -> Result<()> {
        self.table(table)?.update(record)
    }

    /// Replace the contents of `table`
    pub fn rewrite(&self, table: &str, records: &[Record<I, V>]) -> Result<()> {
        self.table(table)?.rewrite(records)
    }

    /// Encoded IDs stored in `table`
    pub fn list_ids(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.table(table)?.list_ids())
    }

    /// Every decodable record in `table`
    pub fn read_all(&self, table: &str) -> Result<Vec<Record<I, V>>> {
        self.table(table)?.read_all()
    }

    /// Borrow the store behind `table`
    pub fn table(&self, table: &str) -> Result<&RecordStore<I, V>> {
        self.stores
            .get(table)
            .ok_or_else(|| SimstorError::TableNotFound(table.to_string()))
    }

    /// Names of all managed tables, sorted
    pub fn tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stores.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Close every table
    ///
    /// Every store is closed even if an earlier one fails; failures are
    /// returned together as `Teardown`.
    pub fn close(&self) -> Result<()> {
        let mut failures = Vec::new();

        for name in self.tables() {
            if let Err(e) = self.stores[name].close() {
                warn!(table = %name, error = %e, "failed to close table");
                failures.push((name.to_string(), e));
            }
        }

        if failures.is_empty() {
            info!("registry closed");
            Ok(())
        } else {
            Err(SimstorError::Teardown(failures))
        }
    }

    fn abort_construction(&mut self) {
        for (name, store) in self.stores.drain() {
            if let Err(e) = store.close() {
                warn!(table = %name, error = %e, "failed to close table after aborted startup");
            }
        }
    }
}
