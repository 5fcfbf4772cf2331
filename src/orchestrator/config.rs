use crate::core::{MigrationError, Result};
use crate::history::DEFAULT_HISTORY_TABLE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_ENABLED: &str = "APP_MIGRATIONS_ENABLED";
pub const ENV_SCHEMA_TIMEOUT_SECS: &str = "APP_MIGRATIONS_SCHEMA_TIMEOUT_SECS";
pub const ENV_STEP_TIMEOUT_SECS: &str = "APP_MIGRATIONS_STEP_TIMEOUT_SECS";
pub const ENV_RERUN_LAST: &str = "APP_MIGRATIONS_RERUN_LAST";
pub const ENV_HISTORY_TABLE: &str = "APP_MIGRATIONS_HISTORY_TABLE";

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Master switch; when false a run is skipped without touching the history
    pub enabled: bool,

    /// Ceiling for the schema migration transaction
    pub schema_timeout: Duration,

    /// Ceiling for each data step; `None` uses the store's ambient default
    pub step_timeout: Option<Duration>,

    /// Re-offer the step matching the latest applied version
    pub rerun_last_applied: bool,

    /// History table for `StoreHistoryEngine::from_config`
    pub history_table: String,
}

impl MigrationConfig {
    pub fn new() -> Self {
        Self {
            enabled: true,
            schema_timeout: Duration::from_secs(15 * 60),
            step_timeout: None,
            rerun_last_applied: true,
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn schema_timeout(mut self, timeout: Duration) -> Self {
        self.schema_timeout = timeout;
        self
    }

    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn rerun_last_applied(mut self, rerun: bool) -> Self {
        self.rerun_last_applied = rerun;
        self
    }

    pub fn history_table(mut self, table: &str) -> Self {
        self.history_table = table.to_string();
        self
    }

    /// Defaults overridden by `APP_MIGRATIONS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `APP_MIGRATIONS_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(raw) = lookup(ENV_ENABLED) {
            config.enabled = parse_bool(ENV_ENABLED, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SCHEMA_TIMEOUT_SECS) {
            config.schema_timeout = parse_secs(ENV_SCHEMA_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_STEP_TIMEOUT_SECS) {
            config.step_timeout = Some(parse_secs(ENV_STEP_TIMEOUT_SECS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_RERUN_LAST) {
            config.rerun_last_applied = parse_bool(ENV_RERUN_LAST, &raw)?;
        }
        if let Some(raw) = lookup(ENV_HISTORY_TABLE) {
            config.history_table = raw.trim().to_string();
        }

        config.validate().map_err(MigrationError::Configuration)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.schema_timeout.is_zero() {
            return Err("schema_timeout must be > 0".to_string());
        }

        if self.step_timeout.is_some_and(|t| t.is_zero()) {
            return Err("step_timeout must be > 0 when set".to_string());
        }

        if self.history_table.trim().is_empty() {
            return Err("history_table cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MigrationError::Configuration(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| {
            MigrationError::Configuration(format!(
                "{} must be a whole number of seconds, got '{}'",
                key,
                raw.trim()
            ))
        })
}
