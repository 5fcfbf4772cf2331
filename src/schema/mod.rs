//! Schema migration collaborator.
//!
//! The orchestrator treats schema changes as opaque: it asks whether anything
//! is pending, then hands the migrator a transaction and waits for it to
//! finish or time out.

pub mod memory;

pub use memory::{MemorySchemaMigrator, SCHEMA_CHANGES_TABLE, SchemaChange};

use crate::transaction::TransactionalStore;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait SchemaMigrator<S: TransactionalStore>: Send + Sync {
    /// Cheap check run before opening the schema transaction.
    async fn has_pending_changes(&self, _store: &S) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Apply every pending change inside `txn`.
    async fn apply_pending(&self, txn: &mut S::Transaction) -> anyhow::Result<()>;
}

#[async_trait]
impl<S, T> SchemaMigrator<S> for Arc<T>
where
    S: TransactionalStore,
    T: SchemaMigrator<S> + ?Sized,
{
    async fn has_pending_changes(&self, store: &S) -> anyhow::Result<bool> {
        (**self).has_pending_changes(store).await
    }

    async fn apply_pending(&self, txn: &mut S::Transaction) -> anyhow::Result<()> {
        (**self).apply_pending(txn).await
    }
}
