use crate::core::{MigrationError, Result, SemanticVersion};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outside control over a run, checked before the schema phase and before
/// every step. A step already running is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `budget` from now.
    pub fn time_budget(self, budget: Duration) -> Self {
        self.deadline(Instant::now() + budget)
    }

    /// Fail if the run was cancelled or its deadline passed.
    pub fn check(&self, phase: &str) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(MigrationError::Cancelled {
                phase: phase.to_string(),
            });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(MigrationError::DeadlineExceeded {
                phase: phase.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// Gate closed; history was not consulted
    Skipped,
    /// History already past every registered step
    HistoryAhead,
    Completed,
}

/// One step executed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedStep {
    pub version: SemanticVersion,
    pub name: String,
    pub first_time: bool,
    /// Whether the version was handed to the engine for registration
    pub registered: bool,
    pub elapsed: Duration,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub current: SemanticVersion,
    pub target: SemanticVersion,
    pub schema_migrated: bool,
    pub steps: Vec<AppliedStep>,
}

impl RunReport {
    pub(crate) fn skipped(target: SemanticVersion) -> Self {
        Self {
            outcome: RunOutcome::Skipped,
            current: SemanticVersion::ZERO,
            target,
            schema_migrated: false,
            steps: Vec::new(),
        }
    }

    pub fn applied_versions(&self) -> Vec<SemanticVersion> {
        self.steps.iter().map(|s| s.version).collect()
    }

    pub fn registered_versions(&self) -> Vec<SemanticVersion> {
        self.steps
            .iter()
            .filter(|s| s.registered)
            .map(|s| s.version)
            .collect()
    }
}

/// Step that the next run would offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub version: SemanticVersion,
    pub first_time: bool,
}

/// Read-only view of what a run would do right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    /// `false` when the config switch or the engine closes the gate
    pub enabled: bool,
    pub current: SemanticVersion,
    pub target: SemanticVersion,
    pub applied: Vec<SemanticVersion>,
    pub pending: Vec<PlannedStep>,
}

impl MigrationPlan {
    pub fn history_ahead(&self) -> bool {
        self.current > self.target
    }

    /// Steps that would run for the first time.
    pub fn new_versions(&self) -> Vec<SemanticVersion> {
        self.pending
            .iter()
            .filter(|s| s.first_time)
            .map(|s| s.version)
            .collect()
    }
}
