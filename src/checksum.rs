//! Checksum utilities for schema version integrity

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA256 checksum of a schema version's canonical root serialization
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from a string
    pub fn of_str(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Compute checksum from a serializable value (canonical JSON form)
    pub fn from_json<T: Serialize>(value: &T) -> Self {
        let canonical = serde_json::to_string(value).unwrap_or_default();
        Self::of_str(&canonical)
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that a serializable value matches this checksum
    pub fn verify_json<T: Serialize>(&self, value: &T) -> bool {
        let computed = Self::from_json(value);
        self.0 == computed.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Checksum {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
