// ============================================================================
// Transaction Boundaries
// ============================================================================
//
// The orchestrator wraps the schema migration in one transaction and every
// data step in its own transaction. It never inspects what happens inside:
// stores expose begin/commit/rollback through `TransactionalStore` and hand
// their concrete transaction type to schema migrators and steps.
//
// ============================================================================

pub mod state;

pub use state::{TransactionId, TransactionMeta, TransactionState};

use crate::core::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Options for a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Human-readable purpose, used in logs and error messages
    pub label: String,

    /// Ceiling for the transaction; `None` uses the store's ambient default
    pub timeout: Option<Duration>,
}

impl TransactionOptions {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn maybe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A data store the orchestrator can open transactions against.
#[async_trait]
pub trait TransactionalStore: Send + Sync + 'static {
    type Transaction: Send + Sync + 'static;

    async fn begin(&self, options: TransactionOptions) -> Result<Self::Transaction>;

    async fn commit(&self, txn: Self::Transaction) -> Result<()>;

    async fn rollback(&self, txn: Self::Transaction) -> Result<()>;
}

/// Store for hosts without a transactional data store.
///
/// Every transaction is a no-op: steps still run one at a time, but nothing is
/// rolled back when one fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransactions;

#[async_trait]
impl TransactionalStore for NoTransactions {
    type Transaction = TransactionMeta;

    async fn begin(&self, options: TransactionOptions) -> Result<Self::Transaction> {
        Ok(TransactionMeta::new(options.label, options.timeout))
    }

    async fn commit(&self, mut txn: Self::Transaction) -> Result<()> {
        txn.commit()
    }

    async fn rollback(&self, mut txn: Self::Transaction) -> Result<()> {
        txn.rollback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let opts = TransactionOptions::new("schema migration").timeout(Duration::from_secs(900));
        assert_eq!(opts.label, "schema migration");
        assert_eq!(opts.timeout, Some(Duration::from_secs(900)));

        let ambient = TransactionOptions::new("step").maybe_timeout(None);
        assert_eq!(ambient.timeout, None);
    }

    #[tokio::test]
    async fn test_no_transactions_lifecycle() {
        let store = NoTransactions;

        let txn = store.begin(TransactionOptions::new("step 1.0.0")).await.unwrap();
        assert!(txn.state().is_active());
        assert_eq!(txn.label(), "step 1.0.0");
        store.commit(txn).await.unwrap();

        let txn = store.begin(TransactionOptions::new("step 1.2.0")).await.unwrap();
        store.rollback(txn).await.unwrap();
    }
}
