use super::config::MigrationConfig;
use super::report::{AppliedStep, MigrationPlan, PlannedStep, RunControl, RunOutcome, RunReport};
use super::state::OrchestratorState;
use crate::core::{MigrationError, Result, SemanticVersion};
use crate::history::{MigrationEngine, current_version};
use crate::migration::{MigrationRegistry, MigrationStep, StepContext, TransferCache};
use crate::schema::SchemaMigrator;
use crate::transaction::{TransactionOptions, TransactionalStore};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, Level, event, info_span};

const SCHEMA_PHASE: &str = "schema migration";
const DATA_PHASE: &str = "data migration";

/// Runs the registered steps against `S` in version order.
///
/// One run at a time: `run` takes `&mut self`, so overlapping runs on the same
/// orchestrator are rejected at compile time.
pub struct MigrationOrchestrator<S: TransactionalStore> {
    store: S,
    engine: Arc<dyn MigrationEngine>,
    registry: MigrationRegistry<S>,
    schema_migrator: Option<Arc<dyn SchemaMigrator<S>>>,
    config: MigrationConfig,
    state: OrchestratorState,
    has_run: bool,
}

pub struct OrchestratorBuilder<S: TransactionalStore> {
    store: S,
    engine: Option<Arc<dyn MigrationEngine>>,
    registry: MigrationRegistry<S>,
    schema_migrator: Option<Arc<dyn SchemaMigrator<S>>>,
    config: MigrationConfig,
    deferred_error: Option<MigrationError>,
}

impl<S: TransactionalStore> OrchestratorBuilder<S> {
    pub fn engine<E: MigrationEngine + 'static>(mut self, engine: E) -> Self {
        self.engine = Some(Arc::new(engine));
        self
    }

    /// Replace the registry wholesale.
    pub fn registry(mut self, registry: MigrationRegistry<S>) -> Self {
        self.registry = registry;
        self
    }

    /// Register one step. A duplicate version surfaces from `build`.
    pub fn step<F, M>(mut self, version: SemanticVersion, factory: F) -> Self
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: MigrationStep<S> + 'static,
    {
        if let Err(err) = self.registry.register(version, factory) {
            self.deferred_error.get_or_insert(err);
        }
        self
    }

    pub fn schema_migrator<M: SchemaMigrator<S> + 'static>(mut self, migrator: M) -> Self {
        self.schema_migrator = Some(Arc::new(migrator));
        self
    }

    pub fn config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    /// # Errors
    /// `Configuration` when no engine was given or the config is invalid,
    /// `DuplicateVersion` when `step` saw the same version twice.
    pub fn build(self) -> Result<MigrationOrchestrator<S>> {
        if let Some(err) = self.deferred_error {
            return Err(err);
        }

        let engine = self.engine.ok_or_else(|| {
            MigrationError::Configuration("no migration engine configured".to_string())
        })?;

        self.config
            .validate()
            .map_err(MigrationError::Configuration)?;

        Ok(MigrationOrchestrator {
            store: self.store,
            engine,
            registry: self.registry,
            schema_migrator: self.schema_migrator,
            config: self.config,
            state: OrchestratorState::Idle,
            has_run: false,
        })
    }
}

impl<S: TransactionalStore> MigrationOrchestrator<S> {
    pub fn builder(store: S) -> OrchestratorBuilder<S> {
        OrchestratorBuilder {
            store,
            engine: None,
            registry: MigrationRegistry::new(),
            schema_migrator: None,
            config: MigrationConfig::default(),
            deferred_error: None,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// True once a run has completed or been skipped. Never reset.
    pub fn has_run(&self) -> bool {
        self.has_run
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &MigrationRegistry<S> {
        &self.registry
    }

    pub async fn run(&mut self) -> Result<RunReport> {
        self.run_with(RunControl::new()).await
    }

    pub async fn run_with(&mut self, control: RunControl) -> Result<RunReport> {
        let span = info_span!(
            "migrations.run",
            target = %self.registry.target_version(),
            steps = self.registry.len()
        );

        let result = self.execute(&control).instrument(span.clone()).await;
        let _enter = span.enter();

        match &result {
            Ok(report) => {
                self.state = match report.outcome {
                    RunOutcome::Skipped => OrchestratorState::Skipped,
                    _ => OrchestratorState::Completed,
                };
                self.has_run = true;
                event!(
                    Level::INFO,
                    outcome = ?report.outcome,
                    current = %report.current,
                    applied = report.steps.len(),
                    "migration run finished"
                );
            }
            Err(err) => {
                let failed_in = self.state;
                self.state = OrchestratorState::Failed;
                event!(Level::ERROR, error = %err, state = %failed_in, "migration run failed");
            }
        }

        result
    }

    /// What a run would do now, without applying anything.
    pub async fn plan(&self) -> Result<MigrationPlan> {
        let enabled = self.config.enabled && self.engine.should_run().await;
        let versions = self.registry.versions();
        let target = self.registry.target_version();
        let applied = self.applied_versions().await?;
        let current = current_version(&applied);

        let pending = if current > target {
            Vec::new()
        } else {
            versions
                .into_iter()
                .filter(|v| self.in_range(*v, current, target))
                .map(|version| PlannedStep {
                    version,
                    first_time: !applied.contains(&version),
                })
                .collect()
        };

        Ok(MigrationPlan {
            enabled,
            current,
            target,
            applied: applied.into_iter().collect(),
            pending,
        })
    }

    async fn execute(&mut self, control: &RunControl) -> Result<RunReport> {
        self.state = OrchestratorState::Gating;
        let gate_open = self.config.enabled && self.engine.should_run().await;
        if !gate_open {
            event!(
                Level::INFO,
                config_enabled = self.config.enabled,
                "application migrations disabled, skipping"
            );
            return Ok(RunReport::skipped(self.registry.target_version()));
        }

        self.state = OrchestratorState::Preparing;
        let steps = self.registry.instantiate()?;
        let target = steps
            .last()
            .map(|step| step.version())
            .unwrap_or(SemanticVersion::ZERO);
        let applied = self.applied_versions().await?;
        let current = current_version(&applied);
        event!(
            Level::DEBUG,
            current = %current,
            target = %target,
            applied = applied.len(),
            "migration history loaded"
        );

        self.hook("before_all", self.engine.before_all()).await?;

        if current > target {
            event!(
                Level::INFO,
                current = %current,
                target = %target,
                "history is ahead of the registered steps, nothing to apply"
            );
            self.hook("after_all", self.engine.after_all()).await?;
            return Ok(RunReport {
                outcome: RunOutcome::HistoryAhead,
                current,
                target,
                schema_migrated: false,
                steps: Vec::new(),
            });
        }

        control.check(if self.schema_migrator.is_some() {
            SCHEMA_PHASE
        } else {
            DATA_PHASE
        })?;
        let mut cache = TransferCache::new();
        let schema_migrated = match self.schema_migrator.clone() {
            Some(migrator) => {
                self.state = OrchestratorState::SchemaPhase;
                self.migrate_schema(migrator.as_ref(), &mut cache).await?
            }
            None => false,
        };

        self.state = OrchestratorState::DataPhase;
        let mut applied_steps = Vec::new();
        for step in steps
            .iter()
            .filter(|step| self.in_range(step.version(), current, target))
        {
            let version = step.version();
            control.check(&format!("step {}", version))?;

            let first_time = !applied.contains(&version);
            let started = Instant::now();
            self.apply_step(step.as_ref(), first_time, &cache)
                .instrument(info_span!("migrations.step", version = %version, first_time))
                .await?;

            let registered = version != current;
            if registered {
                self.engine
                    .register_version(version)
                    .await
                    .map_err(|source| MigrationError::History { source })?;
            }

            event!(
                Level::INFO,
                version = %version,
                step = step.name(),
                first_time,
                registered,
                "migration applied"
            );
            applied_steps.push(AppliedStep {
                version,
                name: step.name().to_string(),
                first_time,
                registered,
                elapsed: started.elapsed(),
            });
        }

        self.hook("after_all", self.engine.after_all()).await?;

        Ok(RunReport {
            outcome: RunOutcome::Completed,
            current,
            target,
            schema_migrated,
            steps: applied_steps,
        })
    }

    async fn migrate_schema(
        &self,
        migrator: &dyn SchemaMigrator<S>,
        cache: &mut TransferCache,
    ) -> Result<bool> {
        self.hook(
            "before_schema_migration",
            self.engine.before_schema_migration(cache),
        )
        .await?;

        let pending = migrator
            .has_pending_changes(&self.store)
            .await
            .map_err(|source| MigrationError::SchemaMigration { source })?;

        if pending {
            let timeout = self.config.schema_timeout;
            let mut txn = self
                .store
                .begin(TransactionOptions::new(SCHEMA_PHASE).timeout(timeout))
                .await?;

            let applied = tokio::time::timeout(timeout, migrator.apply_pending(&mut txn)).await;
            match applied {
                Ok(Ok(())) => self
                    .store
                    .commit(txn)
                    .await
                    .map_err(|err| MigrationError::SchemaMigration { source: err.into() })?,
                Ok(Err(source)) => {
                    return Err(self
                        .abort(txn, MigrationError::SchemaMigration { source })
                        .await);
                }
                Err(_) => {
                    let err = MigrationError::Timeout {
                        phase: SCHEMA_PHASE.to_string(),
                        timeout,
                    };
                    return Err(self.abort(txn, err).await);
                }
            }
            event!(Level::INFO, "schema migration committed");
        } else {
            event!(Level::DEBUG, "no pending schema changes");
        }

        self.hook("after_schema_migration", self.engine.after_schema_migration())
            .await?;
        Ok(pending)
    }

    async fn apply_step(
        &self,
        step: &dyn MigrationStep<S>,
        first_time: bool,
        cache: &TransferCache,
    ) -> Result<()> {
        let version = step.version();
        let options = TransactionOptions::new(format!("migration {}", version))
            .maybe_timeout(self.config.step_timeout);
        let mut txn = self.store.begin(options).await?;

        let outcome = {
            let mut ctx = StepContext::<S>::new(version, first_time, cache, &mut txn);
            match self.config.step_timeout {
                Some(limit) => match tokio::time::timeout(limit, step.up(&mut ctx)).await {
                    Ok(result) => result.map_err(|source| MigrationError::StepApply { version, source }),
                    Err(_) => Err(MigrationError::Timeout {
                        phase: format!("migration {}", version),
                        timeout: limit,
                    }),
                },
                None => step
                    .up(&mut ctx)
                    .await
                    .map_err(|source| MigrationError::StepApply { version, source }),
            }
        };

        match outcome {
            Ok(()) => self
                .store
                .commit(txn)
                .await
                .map_err(|err| MigrationError::StepApply {
                    version,
                    source: err.into(),
                }),
            Err(err) => Err(self.abort(txn, err).await),
        }
    }

    async fn applied_versions(&self) -> Result<BTreeSet<SemanticVersion>> {
        self.engine
            .applied_versions()
            .await
            .map_err(|source| MigrationError::History { source })
    }

    fn in_range(&self, version: SemanticVersion, current: SemanticVersion, target: SemanticVersion) -> bool {
        let above_floor = if self.config.rerun_last_applied {
            version >= current
        } else {
            version > current
        };
        above_floor && version <= target
    }

    async fn hook<F>(&self, hook: &'static str, call: F) -> Result<()>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        call.await.map_err(|source| MigrationError::Hook { hook, source })
    }

    /// Roll back after a failure and hand the original error back.
    async fn abort(&self, txn: S::Transaction, err: MigrationError) -> MigrationError {
        if let Err(rollback_err) = self.store.rollback(txn).await {
            event!(
                Level::ERROR,
                error = %rollback_err,
                "rollback failed after migration error"
            );
        }
        err
    }
}
