//! Ingestion pipeline
//!
//! Wires the stages together for one batch: extract raw bytes into
//! records, infer and join their schemas, resolve the schema version for
//! the group, normalize every record under the resolved version, and
//! order the output. The version decision is committed only after the
//! whole batch's effect has been computed; a failing batch leaves version
//! state untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{IngestError, Result};
use crate::extract::{extract, RecordFormat};
use crate::node::SchemaNode;
use crate::organize::organize;
use crate::registry::{BatchDecision, Resolution, SchemaRegistry};
use crate::transform::{transform, NormalizedRecord};
use crate::version::SchemaVersion;

/// Result of ingesting one batch: what the persistence layer consumes
#[derive(Debug, Clone)]
pub struct IngestOutput {
    /// Normalized records in deterministic order
    pub records: Vec<NormalizedRecord>,
    /// Snapshot of the schema version the batch resolved to
    pub version: SchemaVersion,
    /// Whether the version was reused, extended, or created
    pub outcome: Resolution,
}

/// The ingestion pipeline for one engine instance
pub struct IngestPipeline {
    registry: Arc<SchemaRegistry>,
    config: EngineConfig,
    /// Ingestion sequence counter; assigned per record, never recomputed
    next_seq: AtomicU64,
}

impl IngestPipeline {
    pub fn new(config: EngineConfig) -> Self {
        let registry = Arc::new(SchemaRegistry::new(config.evolution.clone()));
        Self {
            registry,
            config,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Build a pipeline around an existing registry (e.g. one restored
    /// from persisted history).
    pub fn with_registry(config: EngineConfig, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            config,
            next_seq: AtomicU64::new(0),
        }
    }

    /// The registry backing this pipeline
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Ingest one batch of raw bytes for a schema group.
    pub fn ingest(
        &self,
        group: &str,
        bytes: &[u8],
        format: RecordFormat,
    ) -> Result<IngestOutput> {
        let records = extract(bytes, format, &self.config.extract)?;
        if records.is_empty() {
            return Err(IngestError::EmptyBatch {
                group: group.to_string(),
            });
        }
        debug!(group, count = records.len(), %format, "extracted batch");

        // The whole batch's schema effect is computed before any version
        // state is touched.
        let inferred = records
            .iter()
            .map(SchemaNode::infer)
            .fold(SchemaNode::Unknown, SchemaNode::join);

        let BatchDecision { version, outcome } =
            self.registry
                .resolve_batch(group, inferred, records.len() as u64)?;

        let normalized: Vec<NormalizedRecord> = records
            .iter()
            .map(|raw| {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                transform(raw, &version, seq)
            })
            .collect();

        debug!(
            group,
            version = version.id,
            ?outcome,
            records = normalized.len(),
            warnings = normalized.iter().map(|r| r.warnings.len()).sum::<usize>(),
            "normalized batch"
        );

        Ok(IngestOutput {
            records: organize(normalized),
            version,
            outcome,
        })
    }
}
