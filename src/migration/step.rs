use super::TransferCache;
use crate::core::SemanticVersion;
use crate::transaction::TransactionalStore;
use async_trait::async_trait;

/// One versioned application migration.
///
/// A fresh instance is built for every orchestrator run and dropped when the
/// run ends, so implementations should not keep state between runs. `up` may
/// be offered again for the most recently registered version and must be
/// idempotent.
#[async_trait]
pub trait MigrationStep<S: TransactionalStore>: Send + Sync {
    /// Version this step brings the application to. Unique within a registry.
    fn version(&self) -> SemanticVersion;

    /// Name used in logs and reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Apply the migration inside the transaction carried by `ctx`.
    async fn up(&self, ctx: &mut StepContext<'_, S>) -> anyhow::Result<()>;
}

/// Everything a step sees while it runs.
pub struct StepContext<'a, S: TransactionalStore> {
    version: SemanticVersion,
    first_time: bool,
    cache: &'a TransferCache,
    transaction: &'a mut S::Transaction,
}

impl<'a, S: TransactionalStore> StepContext<'a, S> {
    pub fn new(
        version: SemanticVersion,
        first_time: bool,
        cache: &'a TransferCache,
        transaction: &'a mut S::Transaction,
    ) -> Self {
        Self {
            version,
            first_time,
            cache,
            transaction,
        }
    }

    pub fn version(&self) -> SemanticVersion {
        self.version
    }

    /// True when this step's version was absent from the history before this run.
    pub fn first_time(&self) -> bool {
        self.first_time
    }

    /// Values captured by the pre-schema hook. Read-only for steps.
    pub fn cache(&self) -> &TransferCache {
        self.cache
    }

    /// The transaction wrapping this step.
    pub fn transaction(&mut self) -> &mut S::Transaction {
        self.transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{NoTransactions, TransactionOptions};
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<(bool, Option<i64>)>>,
    }

    #[async_trait]
    impl MigrationStep<NoTransactions> for Recorder {
        fn version(&self) -> SemanticVersion {
            SemanticVersion::new(1, 0, 0)
        }

        async fn up(&self, ctx: &mut StepContext<'_, NoTransactions>) -> anyhow::Result<()> {
            let count = ctx.cache().try_get::<i64>("count")?;
            assert!(ctx.transaction().state().is_active());
            self.seen.lock().unwrap().push((ctx.first_time(), count));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_context_exposes_flag_cache_and_transaction() {
        let store = NoTransactions;
        let mut txn = store.begin(TransactionOptions::new("step")).await.unwrap();
        let mut cache = TransferCache::new();
        cache.insert("count", 7).unwrap();

        let step = Recorder {
            seen: Mutex::new(Vec::new()),
        };
        let mut ctx = StepContext::<NoTransactions>::new(step.version(), true, &cache, &mut txn);
        assert_eq!(ctx.version(), SemanticVersion::new(1, 0, 0));
        step.up(&mut ctx).await.unwrap();

        assert_eq!(*step.seen.lock().unwrap(), vec![(true, Some(7))]);
        assert!(step.name().ends_with("Recorder"));
    }
}
