//! Snapshot persistence for the in-memory store.
//!
//! The whole store is written as one MessagePack snapshot after every commit.
//! Writes go to a temporary file in the same directory which is then renamed
//! over the target, so a crash never leaves a half-written snapshot behind.

use super::memory::StoreData;
use crate::core::{MigrationError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub data: StoreData,
}

#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, data: &StoreData) -> Result<()> {
        let parent = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| {
            MigrationError::Io(format!("Failed to create snapshot directory: {}", e))
        })?;

        let snapshot = StoreSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            saved_at: Utc::now(),
            data: data.clone(),
        };
        let serialized = rmp_serde::to_vec(&snapshot).map_err(|e| {
            MigrationError::Serialization(format!("Failed to serialize snapshot: {}", e))
        })?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| MigrationError::Io(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(&serialized)
            .map_err(|e| MigrationError::Io(format!("Failed to write snapshot: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| MigrationError::Io(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.path)
            .map_err(|e| MigrationError::Io(format!("Failed to replace snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoreData>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let file = File::open(&self.path)
            .map_err(|e| MigrationError::Io(format!("Failed to open snapshot: {}", e)))?;
        let mut data = Vec::new();
        BufReader::new(file)
            .read_to_end(&mut data)
            .map_err(|e| MigrationError::Io(format!("Failed to read snapshot: {}", e)))?;

        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data).map_err(|e| {
            MigrationError::Serialization(format!("Failed to deserialize snapshot: {}", e))
        })?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(MigrationError::Serialization(format!(
                "Unsupported snapshot format version {}",
                snapshot.format_version
            )));
        }

        Ok(Some(snapshot.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Table;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(temp_dir.path().join("nested").join("store.snapshot"));
        assert!(file.load().unwrap().is_none());

        let mut table = Table::new("products", ["name"]);
        table
            .insert(json!({"name": "Lamp"}).as_object().cloned().unwrap())
            .unwrap();
        let mut data = StoreData::default();
        data.tables.insert("products".to_string(), table);
        data.version = 3;

        file.save(&data).unwrap();
        assert!(file.exists());

        let loaded = file.load().unwrap().unwrap();
        assert_eq!(loaded.version, 3);
        assert_eq!(loaded.tables["products"].len(), 1);
        assert_eq!(loaded.tables["products"].get(1).unwrap()["name"], json!("Lamp"));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.snapshot");
        fs::write(&path, b"not a snapshot").unwrap();

        let err = SnapshotFile::new(&path).load().unwrap_err();
        assert!(matches!(err, MigrationError::Serialization(_)));
    }
}
