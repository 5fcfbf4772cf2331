//! Explicit registration of migration steps.
//!
//! Each version maps to a factory that builds a fresh step instance. The map
//! is validated as it is filled, so a duplicate version is rejected at
//! startup rather than discovered halfway through a run.

use super::MigrationStep;
use crate::core::{MigrationError, Result, SemanticVersion};
use crate::transaction::TransactionalStore;
use std::collections::BTreeMap;
use std::sync::Arc;

type StepFactory<S> = Arc<dyn Fn() -> Box<dyn MigrationStep<S>> + Send + Sync>;

pub struct MigrationRegistry<S: TransactionalStore> {
    factories: BTreeMap<SemanticVersion, StepFactory<S>>,
}

impl<S: TransactionalStore> MigrationRegistry<S> {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register the factory for `version`.
    ///
    /// # Errors
    /// `DuplicateVersion` if a factory is already registered for `version`.
    pub fn register<F, M>(&mut self, version: SemanticVersion, factory: F) -> Result<()>
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: MigrationStep<S> + 'static,
    {
        if self.factories.contains_key(&version) {
            return Err(MigrationError::DuplicateVersion(version));
        }

        let factory: StepFactory<S> =
            Arc::new(move || -> Box<dyn MigrationStep<S>> { Box::new(factory()) });
        self.factories.insert(version, factory);
        Ok(())
    }

    /// Fluent variant of [`register`](Self::register).
    pub fn with<F, M>(mut self, version: SemanticVersion, factory: F) -> Result<Self>
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: MigrationStep<S> + 'static,
    {
        self.register(version, factory)?;
        Ok(self)
    }

    /// Register a step type built with `Default`.
    pub fn register_default<M>(&mut self, version: SemanticVersion) -> Result<()>
    where
        M: MigrationStep<S> + Default + 'static,
    {
        self.register(version, M::default)
    }

    pub fn contains(&self, version: &SemanticVersion) -> bool {
        self.factories.contains_key(version)
    }

    /// Registered versions in ascending order.
    pub fn versions(&self) -> Vec<SemanticVersion> {
        self.factories.keys().copied().collect()
    }

    /// Highest registered version, or `0.0.0` for an empty registry.
    pub fn target_version(&self) -> SemanticVersion {
        self.factories
            .keys()
            .next_back()
            .copied()
            .unwrap_or(SemanticVersion::ZERO)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build a fresh instance of every step, sorted ascending by version.
    ///
    /// # Errors
    /// `Configuration` when a factory builds a step whose version differs from
    /// the one it was registered under.
    pub fn instantiate(&self) -> Result<Vec<Box<dyn MigrationStep<S>>>> {
        let mut steps = Vec::with_capacity(self.factories.len());
        for (version, factory) in &self.factories {
            let step = factory();
            if step.version() != *version {
                return Err(MigrationError::Configuration(format!(
                    "step '{}' was registered as {} but reports version {}",
                    step.name(),
                    version,
                    step.version()
                )));
            }
            steps.push(step);
        }

        sort_and_validate(&mut steps)?;
        Ok(steps)
    }
}

impl<S: TransactionalStore> Default for MigrationRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TransactionalStore> Clone for MigrationRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            factories: self.factories.clone(),
        }
    }
}

/// Sort steps ascending by version and reject duplicates.
pub fn sort_and_validate<S: TransactionalStore>(
    steps: &mut [Box<dyn MigrationStep<S>>],
) -> Result<()> {
    steps.sort_by_key(|step| step.version());
    if let Some(pair) = steps.windows(2).find(|w| w[0].version() == w[1].version()) {
        return Err(MigrationError::DuplicateVersion(pair[0].version()));
    }
    Ok(())
}
