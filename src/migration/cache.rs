//! Transfer cache: values captured before the schema migration and read by
//! data steps afterwards.
//!
//! Entries are stored as JSON values; typed accessors report a missing key or
//! a value of the wrong shape as an error instead of panicking on a bad cast.

use crate::core::{MigrationError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferCache {
    entries: BTreeMap<String, Value>,
}

impl TransferCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a serializable value under `key`, replacing any previous entry.
    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.entries.insert(key.into(), value);
        Ok(())
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Typed read of a required entry.
    ///
    /// # Errors
    /// `CacheKeyMissing` when absent, `CacheTypeMismatch` when the stored value
    /// does not deserialize into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.try_get(key)?
            .ok_or_else(|| MigrationError::CacheKeyMissing(key.to_string()))
    }

    /// Typed read of an optional entry; only a type mismatch is an error.
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = self.entries.get(key) else {
            return Ok(None);
        };

        T::deserialize(value)
            .map(Some)
            .map_err(|e| MigrationError::CacheTypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
                message: e.to_string(),
            })
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
