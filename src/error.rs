//! Error types for the ingestion core

use thiserror::Error;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Ingestion core errors
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("parse error ({format}) at {position}: {detail}")]
    Parse {
        format: String,
        position: String,
        detail: String,
    },

    #[error("empty batch for group '{group}': no records extracted")]
    EmptyBatch { group: String },

    #[error(
        "schema conflict in group '{group}' against version {version}: \
         field '{field}' expected {expected}, observed {observed}"
    )]
    SchemaConflict {
        group: String,
        version: u64,
        field: String,
        expected: String,
        observed: String,
    },

    #[error("version {id} not found in group '{group}'")]
    VersionNotFound { group: String, id: u64 },

    #[error("schema group not found: {group}")]
    GroupNotFound { group: String },

    #[error("cannot restore group '{group}': {detail}")]
    Restore { group: String, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
