// ============================================================================
// Orchestrator Run States
// ============================================================================
//
// Idle ──> Gating ──> Skipped
//             │
//             └──> Preparing ──> SchemaPhase ──> DataPhase ──> Completed
//
// Any active state moves to Failed on an unrecovered error. Skipped,
// Completed and Failed are terminal for the run; the next run starts again
// from Gating.
//
// ============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrchestratorState {
    /// No run started yet
    #[default]
    Idle,

    /// Consulting the config switch and the engine's `should_run`
    Gating,

    /// Gate closed; nothing else was touched
    Skipped,

    /// Building steps and reading the applied history
    Preparing,

    /// Pre-schema hook, schema transaction, post-schema hook
    SchemaPhase,

    /// Applying steps, one transaction each
    DataPhase,

    /// Run finished, including runs where the history was ahead
    Completed,

    /// Run aborted by an error
    Failed,
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestratorState::Skipped | OrchestratorState::Completed | OrchestratorState::Failed
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != OrchestratorState::Idle
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OrchestratorState::Idle => "IDLE",
            OrchestratorState::Gating => "GATING",
            OrchestratorState::Skipped => "SKIPPED",
            OrchestratorState::Preparing => "PREPARING",
            OrchestratorState::SchemaPhase => "SCHEMA_PHASE",
            OrchestratorState::DataPhase => "DATA_PHASE",
            OrchestratorState::Completed => "COMPLETED",
            OrchestratorState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}
