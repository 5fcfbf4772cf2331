// ============================================================================
// Migration Engine: version history + lifecycle hooks
// ============================================================================
//
// The host supplies one engine per run. It decides whether migrations run at
// all, reports which versions are already applied, records new ones, and is
// notified around the run and around the schema migration.
//
// Two guarantees the orchestrator relies on:
//   * `applied_versions` on a store that was never initialized is an empty
//     set, not an error (first-run bootstrap).
//   * `register_version` for a version already recorded is a no-op.
//
// ============================================================================

pub mod record;
pub mod store;

pub use record::HistoryRecord;
pub use store::{DEFAULT_HISTORY_TABLE, StoreHistoryEngine};

use crate::core::SemanticVersion;
use crate::migration::TransferCache;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

#[async_trait]
pub trait MigrationEngine: Send + Sync {
    /// Gate for the whole run. Returning `false` skips every other call.
    async fn should_run(&self) -> bool {
        true
    }

    async fn applied_versions(&self) -> anyhow::Result<BTreeSet<SemanticVersion>>;

    /// Record `version` as applied. Must tolerate duplicates.
    async fn register_version(&self, version: SemanticVersion) -> anyhow::Result<()>;

    async fn before_all(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_all(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Capture anything the data steps need from the pre-migration schema.
    async fn before_schema_migration(&self, _cache: &mut TransferCache) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_schema_migration(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: MigrationEngine + ?Sized> MigrationEngine for Arc<T> {
    async fn should_run(&self) -> bool {
        (**self).should_run().await
    }

    async fn applied_versions(&self) -> anyhow::Result<BTreeSet<SemanticVersion>> {
        (**self).applied_versions().await
    }

    async fn register_version(&self, version: SemanticVersion) -> anyhow::Result<()> {
        (**self).register_version(version).await
    }

    async fn before_all(&self) -> anyhow::Result<()> {
        (**self).before_all().await
    }

    async fn after_all(&self) -> anyhow::Result<()> {
        (**self).after_all().await
    }

    async fn before_schema_migration(&self, cache: &mut TransferCache) -> anyhow::Result<()> {
        (**self).before_schema_migration(cache).await
    }

    async fn after_schema_migration(&self) -> anyhow::Result<()> {
        (**self).after_schema_migration().await
    }
}

/// Highest applied version, or `0.0.0` for an empty history.
pub fn current_version(applied: &BTreeSet<SemanticVersion>) -> SemanticVersion {
    applied.last().copied().unwrap_or(SemanticVersion::ZERO)
}
