// ============================================================================
// Transaction State Management
// ============================================================================
//
// Each transaction moves through defined states: Active -> Committed/Aborted.
// Stores use these types to reject double commits and to label diagnostics.
//
// ============================================================================

use crate::core::{MigrationError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state following the State Pattern
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is open and accepts work
    Active,

    /// Transaction has been successfully committed
    Committed,

    /// Transaction has been rolled back
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Bookkeeping shared by store transactions: identity, state, label and deadline.
#[derive(Debug, Clone)]
pub struct TransactionMeta {
    id: TransactionId,
    state: TransactionState,
    label: String,
    timeout: Option<Duration>,
    start_time: Instant,
}

impl TransactionMeta {
    pub fn new(label: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            id: TransactionId::new(),
            state: TransactionState::Active,
            label: label.into(),
            timeout,
            start_time: Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// True once the transaction has been open longer than its timeout.
    pub fn is_expired(&self) -> bool {
        self.timeout.is_some_and(|limit| self.duration() > limit)
    }

    /// Fails unless the transaction still accepts work.
    pub fn ensure_active(&self) -> Result<()> {
        if !self.state.is_active() {
            return Err(MigrationError::Transaction(format!(
                "transaction {} ({}) is {}",
                self.id, self.label, self.state
            )));
        }
        Ok(())
    }

    /// Mark transaction as committed
    ///
    /// # Errors
    /// Returns error if transaction is not active or outlived its timeout
    pub fn commit(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(MigrationError::Transaction(format!(
                "Cannot commit: transaction {} is already {}",
                self.id, self.state
            )));
        }
        if self.is_expired() {
            self.state = TransactionState::Aborted;
            return Err(MigrationError::Transaction(format!(
                "Cannot commit: transaction {} ({}) exceeded its timeout of {:?}",
                self.id,
                self.label,
                self.timeout.unwrap_or_default()
            )));
        }

        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Mark transaction as aborted
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn rollback(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(MigrationError::Transaction(format!(
                "Cannot rollback: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.state = TransactionState::Aborted;
        Ok(())
    }
}
