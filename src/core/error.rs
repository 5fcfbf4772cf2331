use super::SemanticVersion;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid version format: '{0}' (expected major.minor.patch)")]
    InvalidVersionFormat(String),

    #[error("Duplicate migration version {0}")]
    DuplicateVersion(SemanticVersion),

    #[error("Schema migration failed: {source}")]
    SchemaMigration {
        #[source]
        source: anyhow::Error,
    },

    #[error("Migration {version} failed: {source}")]
    StepApply {
        version: SemanticVersion,
        #[source]
        source: anyhow::Error,
    },

    #[error("History store error: {source}")]
    History {
        #[source]
        source: anyhow::Error,
    },

    #[error("Lifecycle hook '{hook}' failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{phase} exceeded its timeout of {timeout:?}")]
    Timeout { phase: String, timeout: Duration },

    #[error("Run cancelled before {phase}")]
    Cancelled { phase: String },

    #[error("Run deadline exceeded before {phase}")]
    DeadlineExceeded { phase: String },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Column '{column}' already exists in table '{table}'")]
    ColumnExists { table: String, column: String },

    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("Transfer cache has no entry '{0}'")]
    CacheKeyMissing(String),

    #[error("Transfer cache entry '{key}' is not a {expected}: {message}")]
    CacheTypeMismatch {
        key: String,
        expected: &'static str,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

impl MigrationError {
    /// Whether the error was raised by a phase-boundary check rather than by work itself.
    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            MigrationError::Cancelled { .. } | MigrationError::DeadlineExceeded { .. }
        )
    }
}

impl From<std::io::Error> for MigrationError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let e = MigrationError::Configuration("no engine".into());
        assert_eq!(e.to_string(), "Configuration error: no engine");

        let e = MigrationError::StepApply {
            version: SemanticVersion::new(1, 2, 0),
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(e.to_string(), "Migration 1.2.0 failed: boom");

        let e = MigrationError::InvalidVersionFormat("1.x".into());
        assert!(e.to_string().contains("'1.x'"));
    }

    #[test]
    fn test_step_error_keeps_source() {
        use std::error::Error as _;

        let e = MigrationError::StepApply {
            version: SemanticVersion::new(2, 0, 0),
            source: anyhow::anyhow!("disk full"),
        };
        assert_eq!(e.source().map(|s| s.to_string()).as_deref(), Some("disk full"));
    }

    #[test]
    fn test_interruption_classification() {
        assert!(MigrationError::Cancelled { phase: "schema migration".into() }.is_interruption());
        assert!(MigrationError::DeadlineExceeded { phase: "step 1.0.0".into() }.is_interruption());
        assert!(!MigrationError::Transaction("conflict".into()).is_interruption());
    }
}
