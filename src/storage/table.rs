use crate::core::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A row is a JSON object keyed by column name. The `id` key is assigned by the table.
pub type Row = serde_json::Map<String, Value>;

/// Name of the auto-assigned identifier column present in every table.
pub const ID_COLUMN: &str = "id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: BTreeMap<u64, Row>,
    next_id: u64,
}

impl Table {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns
            .into_iter()
            .map(Into::into)
            .filter(|c: &String| c != ID_COLUMN)
            .collect();

        Self {
            name: name.into(),
            columns,
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared columns, excluding the implicit `id`.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        column == ID_COLUMN || self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert a row, filling missing columns with `null`. Returns the assigned id.
    pub fn insert(&mut self, mut row: Row) -> Result<u64> {
        row.remove(ID_COLUMN);
        if let Some(unknown) = row.keys().find(|k| !self.has_column(k)) {
            return Err(MigrationError::ColumnNotFound {
                table: self.name.clone(),
                column: unknown.clone(),
            });
        }

        let id = self.next_id;
        self.next_id += 1;

        let mut stored = Row::new();
        stored.insert(ID_COLUMN.to_string(), Value::from(id));
        for column in &self.columns {
            let value = row.remove(column).unwrap_or(Value::Null);
            stored.insert(column.clone(), value);
        }

        self.rows.insert(id, stored);
        Ok(id)
    }

    pub fn get(&self, id: u64) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    /// Apply `update` to every row; returns how many rows it reported as changed.
    ///
    /// The `id` column and the set of columns are restored after each call so
    /// updates can only change values.
    pub fn update_rows<F>(&mut self, mut update: F) -> usize
    where
        F: FnMut(&mut Row) -> bool,
    {
        let mut changed = 0;
        for (id, row) in self.rows.iter_mut() {
            if update(row) {
                changed += 1;
            }
            row.insert(ID_COLUMN.to_string(), Value::from(*id));
            row.retain(|k, _| k == ID_COLUMN || self.columns.contains(k));
            for column in &self.columns {
                if !row.contains_key(column) {
                    row.insert(column.clone(), Value::Null);
                }
            }
        }
        changed
    }

    /// Remove every row matching `predicate`; returns how many were removed.
    pub fn delete_rows<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Row) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|_, row| !predicate(row));
        before - self.rows.len()
    }

    pub fn add_column(&mut self, column: &str, default: Value) -> Result<()> {
        if self.has_column(column) {
            return Err(MigrationError::ColumnExists {
                table: self.name.clone(),
                column: column.to_string(),
            });
        }

        self.columns.push(column.to_string());
        for row in self.rows.values_mut() {
            row.insert(column.to_string(), default.clone());
        }
        Ok(())
    }

    pub fn drop_column(&mut self, column: &str) -> Result<()> {
        let position = self.column_position(column)?;
        self.columns.remove(position);
        for row in self.rows.values_mut() {
            row.remove(column);
        }
        Ok(())
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        let position = self.column_position(from)?;
        if self.has_column(to) {
            return Err(MigrationError::ColumnExists {
                table: self.name.clone(),
                column: to.to_string(),
            });
        }

        self.columns[position] = to.to_string();
        for row in self.rows.values_mut() {
            if let Some(value) = row.remove(from) {
                row.insert(to.to_string(), value);
            }
        }
        Ok(())
    }

    fn column_position(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| MigrationError::ColumnNotFound {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_assigns_ids_and_fills_nulls() {
        let mut table = Table::new("products", ["name", "price"]);

        let first = table.insert(row(json!({"name": "Lamp"}))).unwrap();
        let second = table.insert(row(json!({"name": "Desk", "price": 120}))).unwrap();

        assert_eq!((first, second), (1, 2));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap()["price"], Value::Null);
        assert_eq!(table.get(2).unwrap()["id"], json!(2));
    }

    #[test]
    fn test_insert_rejects_unknown_column() {
        let mut table = Table::new("products", ["name"]);
        let err = table.insert(row(json!({"colour": "red"}))).unwrap_err();
        assert!(matches!(err, MigrationError::ColumnNotFound { .. }));
        assert!(table.is_empty());
    }

    #[test]
    fn test_add_and_drop_column() {
        let mut table = Table::new("products", ["name"]);
        table.insert(row(json!({"name": "Lamp"}))).unwrap();

        table.add_column("stock", json!(0)).unwrap();
        assert_eq!(table.get(1).unwrap()["stock"], json!(0));
        assert!(table.add_column("stock", json!(1)).is_err());
        assert!(table.add_column("id", json!(1)).is_err());

        table.drop_column("stock").unwrap();
        assert!(!table.get(1).unwrap().contains_key("stock"));
        assert!(table.drop_column("stock").is_err());
    }

    #[test]
    fn test_rename_column_moves_values() {
        let mut table = Table::new("products", ["title"]);
        table.insert(row(json!({"title": "Lamp"}))).unwrap();

        table.rename_column("title", "name").unwrap();
        assert_eq!(table.columns(), ["name".to_string()]);
        assert_eq!(table.get(1).unwrap()["name"], json!("Lamp"));
    }

    #[test]
    fn test_update_rows_keeps_shape() {
        let mut table = Table::new("products", ["name", "price"]);
        table.insert(row(json!({"name": "Lamp", "price": 10}))).unwrap();
        table.insert(row(json!({"name": "Desk", "price": 100}))).unwrap();

        let changed = table.update_rows(|r| {
            if r["price"].as_i64().unwrap_or(0) < 50 {
                r.insert("price".into(), json!(50));
                r.insert("bogus".into(), json!(true));
                r.insert("id".into(), json!(99));
                true
            } else {
                false
            }
        });

        assert_eq!(changed, 1);
        let lamp = table.get(1).unwrap();
        assert_eq!(lamp["price"], json!(50));
        assert_eq!(lamp["id"], json!(1));
        assert!(!lamp.contains_key("bogus"));
    }

    #[test]
    fn test_delete_rows() {
        let mut table = Table::new("products", ["name"]);
        table.insert(row(json!({"name": "Lamp"}))).unwrap();
        table.insert(row(json!({"name": "Desk"}))).unwrap();

        assert_eq!(table.delete_rows(|r| r["name"] == json!("Lamp")), 1);
        assert_eq!(table.len(), 1);
    }
}
