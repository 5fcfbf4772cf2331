use super::MigrationEngine;
use super::record::HistoryRecord;
use crate::core::{MigrationError, Result, SemanticVersion};
use crate::migration::TransferCache;
use crate::orchestrator::MigrationConfig;
use crate::storage::MemoryStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use tracing::{Level, event};

pub const DEFAULT_HISTORY_TABLE: &str = "migration_history";

/// Row count captured into the transfer cache before the schema migration.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RowCountCapture {
    key: String,
    table: String,
}

/// History engine backed by a table in a [`MemoryStore`].
///
/// Until the first version is registered the table does not exist and the
/// engine reports an empty history. Registering an already recorded version
/// does nothing.
#[derive(Clone)]
pub struct StoreHistoryEngine {
    store: MemoryStore,
    table: String,
    enabled: bool,
    captures: Vec<RowCountCapture>,
}

impl StoreHistoryEngine {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            table: DEFAULT_HISTORY_TABLE.to_string(),
            enabled: true,
            captures: Vec::new(),
        }
    }

    /// Engine writing to `config.history_table`, enabled as `config.enabled`.
    pub fn from_config(store: MemoryStore, config: &MigrationConfig) -> Self {
        Self::new(store)
            .table(config.history_table.clone())
            .enabled(config.enabled)
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Value returned by `should_run`.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Before the schema migration, store the row count of `table` under
    /// `key` in the transfer cache. A missing table counts as zero rows.
    pub fn capture_row_count(mut self, key: impl Into<String>, table: impl Into<String>) -> Self {
        self.captures.push(RowCountCapture {
            key: key.into(),
            table: table.into(),
        });
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// All history records ordered by id.
    pub async fn records(&self) -> Result<Vec<HistoryRecord>> {
        let rows = match self.store.rows(&self.table).await {
            Ok(rows) => rows,
            Err(MigrationError::TableNotFound(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        rows.iter().map(HistoryRecord::from_row).collect()
    }

    /// Insert a record for `version` unless one exists. Returns whether a record was added.
    pub async fn record(&self, version: SemanticVersion) -> Result<bool> {
        let table = self.table.clone();
        self.store
            .write(format!("register {}", version), move |txn| {
                if !txn.table_exists(&table) {
                    txn.create_table(&table, HistoryRecord::columns())?;
                }

                for row in txn.table(&table)?.rows() {
                    if HistoryRecord::version_of(row)? == version {
                        return Ok(false);
                    }
                }

                txn.insert(&table, HistoryRecord::new_row(version, Utc::now()))?;
                Ok(true)
            })
            .await
    }
}

#[async_trait]
impl MigrationEngine for StoreHistoryEngine {
    async fn should_run(&self) -> bool {
        self.enabled
    }

    async fn applied_versions(&self) -> anyhow::Result<BTreeSet<SemanticVersion>> {
        let records = self.records().await?;
        Ok(records.into_iter().map(|r| r.version).collect())
    }

    async fn register_version(&self, version: SemanticVersion) -> anyhow::Result<()> {
        if self.record(version).await? {
            event!(Level::DEBUG, version = %version, table = %self.table, "history record added");
        } else {
            event!(Level::DEBUG, version = %version, "version already in history");
        }
        Ok(())
    }

    async fn before_schema_migration(&self, cache: &mut TransferCache) -> anyhow::Result<()> {
        for capture in &self.captures {
            let count = match self.store.count(&capture.table).await {
                Ok(count) => count,
                Err(MigrationError::TableNotFound(_)) => 0,
                Err(err) => return Err(err.into()),
            };
            cache.insert(capture.key.clone(), count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(s: &str) -> SemanticVersion {
        SemanticVersion::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_missing_table_is_empty_history() {
        let engine = StoreHistoryEngine::new(MemoryStore::new());

        assert!(engine.applied_versions().await.unwrap().is_empty());
        assert!(engine.records().await.unwrap().is_empty());
        assert!(!engine.store().table_exists(DEFAULT_HISTORY_TABLE).await);
    }

    #[tokio::test]
    async fn test_register_creates_table_and_is_idempotent() {
        let store = MemoryStore::new();
        let engine = StoreHistoryEngine::new(store.clone()).table("app_history");

        engine.register_version(v("1.0.0")).await.unwrap();
        engine.register_version(v("1.2.0")).await.unwrap();
        engine.register_version(v("1.0.0")).await.unwrap();

        assert_eq!(store.count("app_history").await.unwrap(), 2);
        let applied = engine.applied_versions().await.unwrap();
        assert_eq!(applied.into_iter().collect::<Vec<_>>(), vec![v("1.0.0"), v("1.2.0")]);

        let records = engine.records().await.unwrap();
        assert_eq!(records[0].id, 1);
        assert_eq!(records[1].version, v("1.2.0"));
        assert!(records[0].applied_at <= records[1].applied_at);
    }

    #[tokio::test]
    async fn test_from_config_uses_history_table() {
        let store = MemoryStore::new();
        let config = MigrationConfig::new().history_table("app_versions");
        let engine = StoreHistoryEngine::from_config(store.clone(), &config);

        assert_eq!(engine.table_name(), "app_versions");
        engine.register_version(v("1.0.0")).await.unwrap();
        assert_eq!(store.count("app_versions").await.unwrap(), 1);
        assert!(!store.table_exists(DEFAULT_HISTORY_TABLE).await);

        let disabled = StoreHistoryEngine::from_config(store, &config.enabled(false));
        assert!(!disabled.should_run().await);
    }

    #[tokio::test]
    async fn test_enabled_flag_drives_should_run() {
        let engine = StoreHistoryEngine::new(MemoryStore::new());
        assert!(engine.should_run().await);
        assert!(!engine.enabled(false).should_run().await);
    }

    #[tokio::test]
    async fn test_capture_row_count() {
        let store = MemoryStore::new();
        store
            .write("setup", |txn| {
                txn.create_table("products", ["name"])?;
                txn.insert("products", json!({"name": "Lamp"}).as_object().cloned().unwrap_or_default())?;
                txn.insert("products", json!({"name": "Desk"}).as_object().cloned().unwrap_or_default())
            })
            .await
            .unwrap();

        let engine = StoreHistoryEngine::new(store)
            .capture_row_count("ProductCountBeforeMigration", "products")
            .capture_row_count("OrderCount", "orders");

        let mut cache = TransferCache::new();
        engine.before_schema_migration(&mut cache).await.unwrap();

        assert_eq!(cache.get::<usize>("ProductCountBeforeMigration").unwrap(), 2);
        assert_eq!(cache.get::<usize>("OrderCount").unwrap(), 0);
    }
}
