use super::SchemaMigrator;
use crate::core::{MigrationError, Result};
use crate::storage::{MemoryStore, MemoryTransaction, Row};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{Level, event};

/// Table recording which named schema changes have been applied.
pub const SCHEMA_CHANGES_TABLE: &str = "__schema_changes";

const NAME_COLUMN: &str = "name";
const APPLIED_AT_COLUMN: &str = "applied_at";

/// A structural change to a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaChange {
    CreateTable {
        table: String,
        columns: Vec<String>,
    },
    AddColumn {
        table: String,
        column: String,
        default: Value,
    },
    DropColumn {
        table: String,
        column: String,
    },
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    DropTable {
        table: String,
    },
}

impl SchemaChange {
    pub fn create_table<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::CreateTable {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add_column(table: impl Into<String>, column: impl Into<String>, default: Value) -> Self {
        Self::AddColumn {
            table: table.into(),
            column: column.into(),
            default,
        }
    }

    pub fn drop_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::DropColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn rename_column(
        table: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::RenameColumn {
            table: table.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn drop_table(table: impl Into<String>) -> Self {
        Self::DropTable {
            table: table.into(),
        }
    }

    pub fn apply(&self, txn: &mut MemoryTransaction) -> Result<()> {
        match self {
            SchemaChange::CreateTable { table, columns } => txn.create_table(table, columns.iter().cloned()),
            SchemaChange::AddColumn {
                table,
                column,
                default,
            } => txn.add_column(table, column, default.clone()),
            SchemaChange::DropColumn { table, column } => txn.drop_column(table, column),
            SchemaChange::RenameColumn { table, from, to } => txn.rename_column(table, from, to),
            SchemaChange::DropTable { table } => txn.drop_table(table).map(|_| ()),
        }
    }
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaChange::CreateTable { table, columns } => {
                write!(f, "CREATE TABLE {} ({})", table, columns.join(", "))
            }
            SchemaChange::AddColumn { table, column, default } => {
                write!(f, "ALTER TABLE {} ADD COLUMN {} DEFAULT {}", table, column, default)
            }
            SchemaChange::DropColumn { table, column } => {
                write!(f, "ALTER TABLE {} DROP COLUMN {}", table, column)
            }
            SchemaChange::RenameColumn { table, from, to } => {
                write!(f, "ALTER TABLE {} RENAME COLUMN {} TO {}", table, from, to)
            }
            SchemaChange::DropTable { table } => write!(f, "DROP TABLE {}", table),
        }
    }
}

/// Ordered list of named schema changes applied to a [`MemoryStore`].
///
/// A change is pending while its name is absent from [`SCHEMA_CHANGES_TABLE`].
/// All pending changes and their tracking rows are written in the single
/// transaction handed to `apply_pending`.
#[derive(Debug, Clone, Default)]
pub struct MemorySchemaMigrator {
    changes: Vec<(String, SchemaChange)>,
}

impl MemorySchemaMigrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change.
    ///
    /// # Errors
    /// `Configuration` if a change with the same name is already listed.
    pub fn push(&mut self, name: impl Into<String>, change: SchemaChange) -> Result<()> {
        let name = name.into();
        if self.changes.iter().any(|(existing, _)| *existing == name) {
            return Err(MigrationError::Configuration(format!(
                "schema change '{}' is listed twice",
                name
            )));
        }
        self.changes.push((name, change));
        Ok(())
    }

    pub fn with(mut self, name: impl Into<String>, change: SchemaChange) -> Result<Self> {
        self.push(name, change)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Names of committed changes.
    pub async fn applied(&self, store: &MemoryStore) -> Result<BTreeSet<String>> {
        match store.rows(SCHEMA_CHANGES_TABLE).await {
            Ok(rows) => Ok(applied_names(&rows)),
            Err(MigrationError::TableNotFound(_)) => Ok(BTreeSet::new()),
            Err(err) => Err(err),
        }
    }

    /// Names of changes not yet committed, in declaration order.
    pub async fn pending(&self, store: &MemoryStore) -> Result<Vec<String>> {
        let applied = self.applied(store).await?;
        Ok(self
            .changes
            .iter()
            .filter(|(name, _)| !applied.contains(name))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn apply_in(&self, txn: &mut MemoryTransaction) -> Result<usize> {
        if !txn.table_exists(SCHEMA_CHANGES_TABLE) {
            txn.create_table(SCHEMA_CHANGES_TABLE, [NAME_COLUMN, APPLIED_AT_COLUMN])?;
        }
        let applied = applied_names(&txn.rows(SCHEMA_CHANGES_TABLE)?);

        let mut count = 0;
        for (name, change) in &self.changes {
            if applied.contains(name) {
                continue;
            }

            change.apply(txn)?;

            let mut row = Row::new();
            row.insert(NAME_COLUMN.to_string(), Value::String(name.clone()));
            row.insert(
                APPLIED_AT_COLUMN.to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
            txn.insert(SCHEMA_CHANGES_TABLE, row)?;

            event!(Level::DEBUG, change = %name, statement = %change, "schema change applied");
            count += 1;
        }
        Ok(count)
    }
}

fn applied_names(rows: &[Row]) -> BTreeSet<String> {
    rows.iter()
        .filter_map(|row| row.get(NAME_COLUMN).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl SchemaMigrator<MemoryStore> for MemorySchemaMigrator {
    async fn has_pending_changes(&self, store: &MemoryStore) -> anyhow::Result<bool> {
        Ok(!self.pending(store).await?.is_empty())
    }

    async fn apply_pending(&self, txn: &mut MemoryTransaction) -> anyhow::Result<()> {
        let count = self.apply_in(txn)?;
        event!(Level::INFO, changes = count, "schema changes applied");
        Ok(())
    }
}
