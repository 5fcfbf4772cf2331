//! Shared fixtures for the orchestrator integration tests.
#![allow(dead_code)]

use app_migrations::prelude::*;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Ordered record of everything the engine and the steps were asked to do.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == entry)
    }

    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }
}

pub fn v(s: &str) -> SemanticVersion {
    SemanticVersion::parse(s).unwrap()
}

pub fn versions(list: &[&str]) -> BTreeSet<SemanticVersion> {
    list.iter().map(|s| v(s)).collect()
}

/// In-memory engine that logs every call.
pub struct RecordingEngine {
    pub log: CallLog,
    applied: Mutex<BTreeSet<SemanticVersion>>,
    should_run: bool,
    cache_entries: Vec<(String, serde_json::Value)>,
    fail_at: Mutex<Option<String>>,
}

impl RecordingEngine {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            applied: Mutex::new(BTreeSet::new()),
            should_run: true,
            cache_entries: Vec::new(),
            fail_at: Mutex::new(None),
        }
    }

    /// Make the named engine call (`before_all`, `register_version`, ...) fail.
    pub fn failing_at(self, call: &str) -> Self {
        *self.fail_at.lock().unwrap() = Some(call.to_string());
        self
    }

    /// Clear the failure set by `failing_at`.
    pub fn recover(&self) {
        *self.fail_at.lock().unwrap() = None;
    }

    fn enter(&self, call: &str) -> anyhow::Result<()> {
        self.log.push(call);
        if self.fail_at.lock().unwrap().as_deref() == Some(call) {
            anyhow::bail!("{} unavailable", call);
        }
        Ok(())
    }

    pub fn with_applied(self, list: &[&str]) -> Self {
        *self.applied.lock().unwrap() = versions(list);
        self
    }

    pub fn with_should_run(mut self, should_run: bool) -> Self {
        self.should_run = should_run;
        self
    }

    pub fn capture(mut self, key: &str, value: serde_json::Value) -> Self {
        self.cache_entries.push((key.to_string(), value));
        self
    }

    pub fn applied(&self) -> BTreeSet<SemanticVersion> {
        self.applied.lock().unwrap().clone()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl MigrationEngine for RecordingEngine {
    async fn should_run(&self) -> bool {
        self.log.push("should_run");
        self.should_run
    }

    async fn applied_versions(&self) -> anyhow::Result<BTreeSet<SemanticVersion>> {
        self.log.push("applied_versions");
        Ok(self.applied())
    }

    async fn register_version(&self, version: SemanticVersion) -> anyhow::Result<()> {
        if self.fail_at.lock().unwrap().as_deref() == Some("register_version") {
            anyhow::bail!("history down");
        }
        self.log.push(format!("register {}", version));
        self.applied.lock().unwrap().insert(version);
        Ok(())
    }

    async fn before_all(&self) -> anyhow::Result<()> {
        self.enter("before_all")
    }

    async fn after_all(&self) -> anyhow::Result<()> {
        self.enter("after_all")
    }

    async fn before_schema_migration(&self, cache: &mut TransferCache) -> anyhow::Result<()> {
        self.enter("before_schema_migration")?;
        for (key, value) in &self.cache_entries {
            cache.insert_value(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn after_schema_migration(&self) -> anyhow::Result<()> {
        self.enter("after_schema_migration")
    }
}

/// Step that logs `up <version> first_time=<flag>` and can be told to fail,
/// to cancel a token, or to read a cache key.
#[derive(Clone)]
pub struct ScriptedStep {
    pub version: SemanticVersion,
    pub log: CallLog,
    pub fail: bool,
    pub cancel: Option<CancellationToken>,
    pub cache_key: Option<String>,
}

impl ScriptedStep {
    pub fn new(version: &str, log: &CallLog) -> Self {
        Self {
            version: v(version),
            log: log.clone(),
            fail: false,
            cancel: None,
            cache_key: None,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn reading(mut self, key: &str) -> Self {
        self.cache_key = Some(key.to_string());
        self
    }
}

#[async_trait]
impl<S: TransactionalStore> MigrationStep<S> for ScriptedStep {
    fn version(&self) -> SemanticVersion {
        self.version
    }

    async fn up(&self, ctx: &mut StepContext<'_, S>) -> anyhow::Result<()> {
        self.log
            .push(format!("up {} first_time={}", self.version, ctx.first_time()));

        if let Some(key) = &self.cache_key {
            let value: Option<i64> = ctx.cache().try_get(key)?;
            self.log.push(format!("cache {}={:?}", key, value));
        }
        if let Some(token) = &self.cancel {
            token.cancel();
        }
        if self.fail {
            anyhow::bail!("step {} exploded", self.version);
        }
        Ok(())
    }
}

/// Step that appends one row to `events` and can fail afterwards.
#[derive(Clone)]
pub struct EventStep {
    pub version: SemanticVersion,
    pub fail_after_insert: bool,
}

impl EventStep {
    pub fn new(version: &str) -> Self {
        Self {
            version: v(version),
            fail_after_insert: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_after_insert = true;
        self
    }
}

#[async_trait]
impl MigrationStep<MemoryStore> for EventStep {
    fn version(&self) -> SemanticVersion {
        self.version
    }

    async fn up(&self, ctx: &mut StepContext<'_, MemoryStore>) -> anyhow::Result<()> {
        let version = self.version.to_string();
        let first_time = ctx.first_time();
        let row = json!({"version": version, "first_time": first_time});
        ctx.transaction()
            .insert("events", row.as_object().cloned().unwrap_or_default())?;

        if self.fail_after_insert {
            anyhow::bail!("step {} failed after writing", self.version);
        }
        Ok(())
    }
}

/// Step that sleeps longer than any timeout used in tests.
pub struct SlowStep(pub SemanticVersion);

#[async_trait]
impl<S: TransactionalStore> MigrationStep<S> for SlowStep {
    fn version(&self) -> SemanticVersion {
        self.0
    }

    async fn up(&self, _ctx: &mut StepContext<'_, S>) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
}

/// Schema migrator that creates a table and then hangs.
pub struct SlowSchemaMigrator;

#[async_trait]
impl SchemaMigrator<MemoryStore> for SlowSchemaMigrator {
    async fn apply_pending(&self, txn: &mut MemoryTransaction) -> anyhow::Result<()> {
        txn.create_table("half_done", ["x"])?;
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
}

/// Schema migrator that creates `events` while a second writer commits
/// underneath it, so its own commit conflicts.
pub struct ConflictingSchemaMigrator {
    pub store: MemoryStore,
}

#[async_trait]
impl SchemaMigrator<MemoryStore> for ConflictingSchemaMigrator {
    async fn apply_pending(&self, txn: &mut MemoryTransaction) -> anyhow::Result<()> {
        txn.create_table("events", ["version", "first_time"])?;
        self.store
            .write("concurrent writer", |other| other.create_table("audit", ["entry"]))
            .await?;
        Ok(())
    }
}

/// Schema migrator for `NoTransactions` that only logs.
pub struct LoggingSchemaMigrator {
    pub log: CallLog,
    pub pending: bool,
}

#[async_trait]
impl SchemaMigrator<NoTransactions> for LoggingSchemaMigrator {
    async fn has_pending_changes(&self, _store: &NoTransactions) -> anyhow::Result<bool> {
        Ok(self.pending)
    }

    async fn apply_pending(
        &self,
        _txn: &mut <NoTransactions as TransactionalStore>::Transaction,
    ) -> anyhow::Result<()> {
        self.log.push("apply_schema");
        Ok(())
    }
}

/// Schema for store-backed tests: an `events` table.
pub fn events_schema() -> MemorySchemaMigrator {
    MemorySchemaMigrator::new()
        .with(
            "001_events",
            SchemaChange::create_table("events", ["version", "first_time"]),
        )
        .unwrap()
}
