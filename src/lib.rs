//! Schemaflow
//!
//! A schema inference and evolution engine for semi-structured record
//! ingestion. Records of unknown and evolving shape are parsed into
//! trees, a structural schema is inferred per record and joined across
//! the batch, the group's version lineage decides whether the current
//! version is reused, extended, or superseded, and every record is
//! normalized into a canonical, version-tagged form with deterministic
//! output order.
//!
//! ## Data flow
//!
//! ```text
//! raw bytes ─▶ extract ─▶ records ─▶ infer + join ─▶ resolve version
//!                                                        │
//!            loader ◀─ organize ◀─ transform ◀───────────┘
//! ```
//!
//! - **Extraction** (`extract`): JSON, line-delimited JSON, or CSV bytes
//!   into ordered record trees; malformed batches rejected atomically.
//! - **Schema detection** (`node`): a type lattice with a commutative,
//!   associative, idempotent join, so inference is independent of record
//!   order.
//! - **Evolution tracking** (`registry`): append-only version logs per
//!   schema group; additive changes extend the current version in place,
//!   incompatible changes supersede it, ids strictly increase with no
//!   gaps.
//! - **Normalization** (`transform`): schema-ordered keys, explicit nulls
//!   for absent optional fields, unambiguous coercions with non-fatal
//!   warnings.
//! - **Organization** (`organize`): deterministic output order by version
//!   id and ingestion sequence.

pub mod checksum;
pub mod config;
pub mod error;
pub mod extract;
pub mod loader;
pub mod node;
pub mod organize;
pub mod pipeline;
pub mod registry;
pub mod transform;
pub mod version;

pub use checksum::Checksum;
pub use config::{EngineConfig, EvolutionConfig, ExtractConfig, StoreConfig};
pub use error::{IngestError, Result};
pub use extract::{extract, RecordFormat};
pub use loader::{DirLoader, Loader};
pub use node::{FieldSchema, SchemaNode};
pub use organize::{by_version, organize};
pub use pipeline::{IngestOutput, IngestPipeline};
pub use registry::{BatchDecision, Resolution, SchemaRegistry};
pub use transform::{transform, CoercionWarning, NormalizedRecord};
pub use version::{SchemaVersion, VersionSummary};
