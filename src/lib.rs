// ============================================================================
// app-migrations Library
// ============================================================================

pub mod core;
pub mod history;
pub mod migration;
pub mod orchestrator;
pub mod prelude;
pub mod schema;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use crate::core::{MigrationError, Result, SemanticVersion};
pub use crate::history::{HistoryRecord, MigrationEngine, StoreHistoryEngine};
pub use crate::migration::{MigrationRegistry, MigrationStep, StepContext, TransferCache};
pub use crate::orchestrator::{
    MigrationConfig, MigrationOrchestrator, MigrationPlan, OrchestratorBuilder, OrchestratorState,
    RunControl, RunOutcome, RunReport,
};
pub use crate::schema::{MemorySchemaMigrator, SchemaChange, SchemaMigrator};
pub use crate::storage::{MemoryStore, MemoryTransaction, Row};
pub use crate::transaction::{NoTransactions, TransactionOptions, TransactionalStore};
