//! Everything a host needs to define steps and wire up a run.

pub use crate::core::{MigrationError, Result, SemanticVersion};
pub use crate::history::{HistoryRecord, MigrationEngine, StoreHistoryEngine};
pub use crate::migration::{MigrationRegistry, MigrationStep, StepContext, TransferCache};
pub use crate::orchestrator::{
    AppliedStep, MigrationConfig, MigrationOrchestrator, MigrationPlan, OrchestratorBuilder,
    OrchestratorState, RunControl, RunOutcome, RunReport,
};
pub use crate::schema::{MemorySchemaMigrator, SchemaChange, SchemaMigrator};
pub use crate::storage::{MemoryStore, MemoryTransaction, Row};
pub use crate::transaction::{NoTransactions, TransactionOptions, TransactionalStore};
