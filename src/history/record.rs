use crate::core::{MigrationError, Result, SemanticVersion};
use crate::storage::{ID_COLUMN, Row};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const VERSION_COLUMN: &str = "version";
pub const APPLIED_AT_COLUMN: &str = "applied_at";

/// One applied version as stored in the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: u64,
    pub version: SemanticVersion,
    pub applied_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn columns() -> [&'static str; 2] {
        [VERSION_COLUMN, APPLIED_AT_COLUMN]
    }

    /// Row for a new record; the id is assigned by the table on insert.
    pub fn new_row(version: SemanticVersion, applied_at: DateTime<Utc>) -> Row {
        let mut row = Row::new();
        row.insert(VERSION_COLUMN.to_string(), Value::String(version.to_string()));
        row.insert(
            APPLIED_AT_COLUMN.to_string(),
            Value::String(applied_at.to_rfc3339()),
        );
        row
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        let id = row
            .get(ID_COLUMN)
            .and_then(Value::as_u64)
            .ok_or_else(|| malformed(row, ID_COLUMN))?;
        let version = row
            .get(VERSION_COLUMN)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(row, VERSION_COLUMN))?;
        let applied_at = row
            .get(APPLIED_AT_COLUMN)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(row, APPLIED_AT_COLUMN))?;

        let applied_at = DateTime::parse_from_rfc3339(applied_at)
            .map_err(|e| {
                MigrationError::Serialization(format!(
                    "history record {} has an invalid timestamp: {}",
                    id, e
                ))
            })?
            .with_timezone(&Utc);

        Ok(Self {
            id,
            version: SemanticVersion::parse(version)?,
            applied_at,
        })
    }

    /// Read just the version of a stored row.
    pub fn version_of(row: &Row) -> Result<SemanticVersion> {
        row.get(VERSION_COLUMN)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(row, VERSION_COLUMN))
            .and_then(SemanticVersion::parse)
    }
}

fn malformed(row: &Row, column: &str) -> MigrationError {
    MigrationError::Serialization(format!(
        "history row {} is missing column '{}'",
        Value::Object(row.clone()),
        column
    ))
}
