//! Deterministic batch ordering
//!
//! Orders normalized records for stable output: schema version id
//! ascending, then the ingestion sequence number assigned at transform
//! time. Pure; running it twice on the same batch yields the same order.

use std::collections::BTreeMap;

use crate::transform::NormalizedRecord;

/// Sort a batch into its deterministic total order.
pub fn organize(mut records: Vec<NormalizedRecord>) -> Vec<NormalizedRecord> {
    records.sort_by_key(|r| (r.schema_version_id, r.seq));
    records
}

/// Group an organized batch by schema version id, preserving record
/// order within each version.
pub fn by_version(records: &[NormalizedRecord]) -> BTreeMap<u64, Vec<&NormalizedRecord>> {
    let mut groups: BTreeMap<u64, Vec<&NormalizedRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.schema_version_id).or_default().push(record);
    }
    groups
}
