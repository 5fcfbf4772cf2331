// ============================================================================
// Migration Orchestrator
// ============================================================================
//
// A run walks Gating -> Preparing -> SchemaPhase -> DataPhase -> Completed:
//
//   1. the config switch and the engine decide whether to run at all
//   2. steps are built fresh and sorted, the applied history is read
//   3. `before_all`; nothing more happens if the history is ahead
//   4. pre-schema hook fills the transfer cache, the schema migrator runs
//      in one transaction with its own timeout, post-schema hook
//   5. every step in [current, target] runs in its own transaction and is
//      registered unless it is the current version
//   6. `after_all`
//
// ============================================================================

pub mod config;
pub mod report;
pub mod runner;
pub mod state;

pub use config::MigrationConfig;
pub use report::{AppliedStep, MigrationPlan, PlannedStep, RunControl, RunOutcome, RunReport};
pub use runner::{MigrationOrchestrator, OrchestratorBuilder};
pub use state::OrchestratorState;
