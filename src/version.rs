//! Schema version value types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::checksum::Checksum;
use crate::node::SchemaNode;

/// One snapshot of a schema group's structure.
///
/// Ids start at 1 and are strictly increasing per group with no gaps;
/// an id is never reused. Only the group's current version may be
/// extended in place; superseded versions are immutable and never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Monotonically increasing version id within the group
    pub id: u64,
    /// Root schema node
    pub root: SchemaNode,
    /// When this version was created
    pub created_at: DateTime<Utc>,
    /// Running count of records ingested under this version
    pub record_count: u64,
    /// SHA256 of the canonical root serialization
    pub checksum: Checksum,
}

impl SchemaVersion {
    /// Create a new version from an inferred root
    pub fn new(id: u64, root: SchemaNode) -> Self {
        let checksum = Checksum::from_json(&root);
        Self {
            id,
            root,
            created_at: Utc::now(),
            record_count: 0,
            checksum,
        }
    }

    /// Replace the root with a widened node, keeping the id. Only valid
    /// for the group's current version.
    pub(crate) fn extend_root(&mut self, root: SchemaNode) {
        self.checksum = Checksum::from_json(&root);
        self.root = root;
    }

    /// Verify the checksum matches the root
    pub fn verify_checksum(&self) -> bool {
        self.checksum.verify_json(&self.root)
    }

    /// Summary view for listing
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            id: self.id,
            created_at: self.created_at,
            record_count: self.record_count,
            checksum: self.checksum.clone(),
            root_kind: self.root.kind_name().to_string(),
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.id)
    }
}

/// Lightweight version listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSummary {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub record_count: u64,
    pub checksum: Checksum,
    pub root_kind: String,
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.checksum == other.checksum
    }
}

impl Eq for SchemaVersion {}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}
