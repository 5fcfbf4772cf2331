// ============================================================================
// In-Memory Transactional Store
// ============================================================================
//
// Copy-on-write transactions: `begin` clones the committed tables into a
// private working copy, `commit` swaps the working copy in if nobody else
// committed in the meantime, `rollback` simply drops it. Readers outside a
// transaction always see the last committed state.
//
// ============================================================================

use super::persistence::SnapshotFile;
use super::table::{Row, Table};
use crate::core::{MigrationError, Result};
use crate::transaction::{TransactionId, TransactionMeta, TransactionOptions, TransactionalStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Committed contents of a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreData {
    pub tables: BTreeMap<String, Table>,
    /// Incremented on every commit; used for write-write conflict detection
    pub version: u64,
}

struct StoreInner {
    data: RwLock<StoreData>,
    snapshot: Option<SnapshotFile>,
}

/// Cloneable handle to a shared in-memory table store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                data: RwLock::new(StoreData::default()),
                snapshot: None,
            }),
        }
    }

    /// Open a store backed by a snapshot file, loading it when it exists.
    ///
    /// Every later commit rewrites the snapshot.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let snapshot = SnapshotFile::new(path);
        let data = snapshot.load()?.unwrap_or_default();

        Ok(Self {
            inner: Arc::new(StoreInner {
                data: RwLock::new(data),
                snapshot: Some(snapshot),
            }),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.inner.snapshot.as_ref().map(|s| s.path())
    }

    pub async fn table_exists(&self, name: &str) -> bool {
        self.inner.data.read().await.tables.contains_key(name)
    }

    pub async fn table_names(&self) -> Vec<String> {
        self.inner.data.read().await.tables.keys().cloned().collect()
    }

    /// Committed rows of a table.
    pub async fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let data = self.inner.data.read().await;
        let table = data
            .tables
            .get(table)
            .ok_or_else(|| MigrationError::TableNotFound(table.to_string()))?;
        Ok(table.rows().cloned().collect())
    }

    pub async fn count(&self, table: &str) -> Result<usize> {
        let data = self.inner.data.read().await;
        data.tables
            .get(table)
            .map(Table::len)
            .ok_or_else(|| MigrationError::TableNotFound(table.to_string()))
    }

    /// Number of commits applied to this store.
    pub async fn version(&self) -> u64 {
        self.inner.data.read().await.version
    }

    /// Insert a single row in its own transaction.
    pub async fn insert(&self, table: &str, row: Row) -> Result<u64> {
        self.write(format!("insert into {}", table), |txn| txn.insert(table, row))
            .await
    }

    /// Run `work` inside a transaction, committing on success and rolling back on error.
    pub async fn write<F, T>(&self, label: impl Into<String>, work: F) -> Result<T>
    where
        F: FnOnce(&mut MemoryTransaction) -> Result<T> + Send,
        T: Send,
    {
        let mut txn = self.begin(TransactionOptions::new(label)).await?;
        match work(&mut txn) {
            Ok(value) => {
                self.commit(txn).await?;
                Ok(value)
            }
            Err(err) => {
                self.rollback(txn).await?;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self, options: TransactionOptions) -> Result<MemoryTransaction> {
        let data = self.inner.data.read().await;
        Ok(MemoryTransaction {
            meta: TransactionMeta::new(options.label, options.timeout),
            base_version: data.version,
            working: data.clone(),
        })
    }

    async fn commit(&self, mut txn: MemoryTransaction) -> Result<()> {
        let mut data = self.inner.data.write().await;

        if data.version != txn.base_version {
            txn.meta.rollback()?;
            return Err(MigrationError::Transaction(format!(
                "Write-write conflict detected: {} ({}) started at store version {} but the store is at {}",
                txn.meta.id(),
                txn.meta.label(),
                txn.base_version,
                data.version
            )));
        }

        txn.meta.commit()?;

        let mut working = txn.working;
        working.version = data.version + 1;

        // Persist first so a failed write leaves the committed state untouched.
        if let Some(snapshot) = &self.inner.snapshot {
            snapshot.save(&working)?;
        }

        *data = working;
        Ok(())
    }

    async fn rollback(&self, mut txn: MemoryTransaction) -> Result<()> {
        txn.meta.rollback()
    }
}

/// Private working copy of a `MemoryStore` opened by `begin`.
#[derive(Debug)]
pub struct MemoryTransaction {
    meta: TransactionMeta,
    base_version: u64,
    working: StoreData,
}

impl MemoryTransaction {
    pub fn id(&self) -> TransactionId {
        self.meta.id()
    }

    pub fn meta(&self) -> &TransactionMeta {
        &self.meta
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.working.tables.contains_key(name)
    }

    pub fn create_table<I, S>(&mut self, name: &str, columns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.table_exists(name) {
            return Err(MigrationError::TableExists(name.to_string()));
        }
        self.working
            .tables
            .insert(name.to_string(), Table::new(name, columns));
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> Result<Table> {
        self.working
            .tables
            .remove(name)
            .ok_or_else(|| MigrationError::TableNotFound(name.to_string()))
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.working
            .tables
            .get(name)
            .ok_or_else(|| MigrationError::TableNotFound(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.working
            .tables
            .get_mut(name)
            .ok_or_else(|| MigrationError::TableNotFound(name.to_string()))
    }

    pub fn insert(&mut self, table: &str, row: Row) -> Result<u64> {
        self.table_mut(table)?.insert(row)
    }

    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        Ok(self.table(table)?.rows().cloned().collect())
    }

    pub fn count(&self, table: &str) -> Result<usize> {
        Ok(self.table(table)?.len())
    }

    pub fn update_rows<F>(&mut self, table: &str, update: F) -> Result<usize>
    where
        F: FnMut(&mut Row) -> bool,
    {
        Ok(self.table_mut(table)?.update_rows(update))
    }

    pub fn delete_rows<F>(&mut self, table: &str, predicate: F) -> Result<usize>
    where
        F: FnMut(&Row) -> bool,
    {
        Ok(self.table_mut(table)?.delete_rows(predicate))
    }

    pub fn add_column(&mut self, table: &str, column: &str, default: Value) -> Result<()> {
        self.table_mut(table)?.add_column(column, default)
    }

    pub fn drop_column(&mut self, table: &str, column: &str) -> Result<()> {
        self.table_mut(table)?.drop_column(column)
    }

    pub fn rename_column(&mut self, table: &str, from: &str, to: &str) -> Result<()> {
        self.table_mut(table)?.rename_column(from, to)
    }
}
