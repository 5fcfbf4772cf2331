// ============================================================================
// Semantic Version
// ============================================================================
//
// Immutable (major, minor, patch) triple used to identify application
// migrations and history records. Ordering is lexicographic on the three
// components, which is exactly the derived `Ord` for the field order below.
//
// ============================================================================

use super::{MigrationError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref VERSION_PATTERN: Regex =
        Regex::new(r"^([0-9]+)\.([0-9]+)\.([0-9]+)$").expect("version pattern is valid");
}

/// A comparable `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemanticVersion {
    /// `0.0.0`, the version of an empty history or an empty step set.
    pub const ZERO: SemanticVersion = SemanticVersion::new(0, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a `major.minor.patch` string.
    ///
    /// Leading zeros are accepted and dropped, so `to_string` gives back the
    /// input only when it is canonical (`01.002.0` renders as `1.2.0`).
    ///
    /// # Errors
    /// Returns `InvalidVersionFormat` when the input is not three dot-separated
    /// decimal components, or when a component does not fit in a `u32`.
    pub fn parse(input: &str) -> Result<Self> {
        let caps = VERSION_PATTERN
            .captures(input)
            .ok_or_else(|| MigrationError::InvalidVersionFormat(input.to_string()))?;

        let component = |idx: usize| -> Result<u32> {
            caps[idx]
                .parse::<u32>()
                .map_err(|_| MigrationError::InvalidVersionFormat(input.to_string()))
        };

        Ok(Self::new(component(1)?, component(2)?, component(3)?))
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for SemanticVersion {
    type Error = MigrationError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

// Serialized as the canonical string so history snapshots stay readable.
impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SemanticVersion::parse(&raw).map_err(serde::de::Error::custom)
    }
}
