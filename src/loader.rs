//! Persistence collaborator seam
//!
//! The core hands the persistence layer normalized records plus the
//! version snapshot they resolved to; everything behind that boundary is
//! replaceable. [`DirLoader`] is the shipped implementation: a plain
//! directory layout with one JSON file per schema version, ndjson batch
//! files, and a checksums file per group. Persistence failures never
//! mutate in-memory schema state.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{IngestError, Result};
use crate::registry::SchemaRegistry;
use crate::transform::NormalizedRecord;
use crate::version::SchemaVersion;

/// Persistence seam between the ingestion core and storage
pub trait Loader {
    /// Persist an organized batch of normalized records
    fn store_batch(&self, group: &str, records: &[NormalizedRecord]) -> Result<()>;

    /// Persist a created or extended schema version
    fn store_version(&self, group: &str, version: &SchemaVersion) -> Result<()>;
}

/// Directory-backed loader
///
/// Layout:
/// ```text
/// groups/
/// └── {group}/
///     ├── versions/
///     │   ├── v1.json
///     │   └── v2.json
///     ├── batches/
///     │   └── batch_00000000.ndjson
///     └── checksums.sha256
/// ```
pub struct DirLoader {
    root: PathBuf,
    pretty: bool,
    include_checksums: bool,
}

impl DirLoader {
    /// Open a loader rooted at the configured store path
    pub fn open(config: &StoreConfig) -> Result<Self> {
        fs::create_dir_all(config.path.join("groups"))?;
        Ok(Self {
            root: config.path.clone(),
            pretty: config.pretty_json,
            include_checksums: config.include_checksums,
        })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Seed a registry from every group persisted under this root.
    pub fn restore_registry(&self, registry: &SchemaRegistry) -> Result<()> {
        let groups_dir = self.root.join("groups");
        if !groups_dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&groups_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let group = entry.file_name().to_string_lossy().to_string();
            let versions = self.load_versions(&group)?;
            if versions.is_empty() {
                continue;
            }
            registry.restore(&group, versions)?;
        }
        Ok(())
    }

    /// Read a group's persisted versions, ordered by id
    pub fn load_versions(&self, group: &str) -> Result<Vec<SchemaVersion>> {
        let dir = self.group_dir(group).join("versions");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            let version: SchemaVersion =
                serde_json::from_str(&content).map_err(|e| IngestError::Restore {
                    group: group.to_string(),
                    detail: format!("{}: {}", path.display(), e),
                })?;
            versions.push(version);
        }
        versions.sort();
        Ok(versions)
    }

    fn group_dir(&self, group: &str) -> PathBuf {
        self.root.join("groups").join(group)
    }

    fn to_json<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        let content = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(content)
    }

    /// Rewrite the group's checksums file from its persisted versions
    fn write_checksums(&self, group: &str) -> Result<()> {
        let versions = self.load_versions(group)?;
        let content: String = versions
            .iter()
            .map(|v| format!("{}  versions/v{}.json", v.checksum, v.id))
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(self.group_dir(group).join("checksums.sha256"), content)?;
        Ok(())
    }
}

/// One past the highest batch index already present in `dir`.
fn next_batch_index(dir: &Path) -> Result<u64> {
    let mut next = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("ndjson") {
            continue;
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if let Some(n) = stem
            .strip_prefix("batch_")
            .and_then(|s| s.parse::<u64>().ok())
        {
            next = next.max(n + 1);
        }
    }
    Ok(next)
}

impl Loader for DirLoader {
    fn store_batch(&self, group: &str, records: &[NormalizedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let dir = self.group_dir(group).join("batches");
        fs::create_dir_all(&dir)?;

        // Batch files are numbered by their position in the group's
        // history, not by record sequence: sequence counters restart with
        // the process, and a restarted writer must never overwrite an
        // earlier batch.
        let index = next_batch_index(&dir)?;
        let path = dir.join(format!("batch_{:08}.ndjson", index));
        let mut file = fs::File::create(&path)?;
        for record in records {
            serde_json::to_writer(&mut file, record)?;
            file.write_all(b"\n")?;
        }
        debug!(group, path = %path.display(), records = records.len(), "stored batch");
        Ok(())
    }

    fn store_version(&self, group: &str, version: &SchemaVersion) -> Result<()> {
        let dir = self.group_dir(group).join("versions");
        fs::create_dir_all(&dir)?;

        // Only the current version is ever rewritten (extension in
        // place); superseded version files never change again.
        let path = dir.join(format!("v{}.json", version.id));
        fs::write(&path, self.to_json(version)?)?;

        if self.include_checksums {
            self.write_checksums(group)?;
        }
        info!(group, version = version.id, "stored schema version");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, EvolutionConfig};
    use crate::extract::RecordFormat;
    use crate::pipeline::IngestPipeline;
    use tempfile::tempdir;

    fn store_config(dir: &Path) -> StoreConfig {
        StoreConfig {
            path: dir.to_path_buf(),
            ..StoreConfig::default()
        }
    }

    #[test]
    fn test_store_and_reload_versions() {
        let dir = tempdir().unwrap();
        let loader = DirLoader::open(&store_config(dir.path())).unwrap();

        let pipeline = IngestPipeline::new(EngineConfig::default());
        let out1 = pipeline
            .ingest("users", br#"[{"a":1}]"#, RecordFormat::Json)
            .unwrap();
        loader.store_batch("users", &out1.records).unwrap();
        loader.store_version("users", &out1.version).unwrap();

        let out2 = pipeline
            .ingest("users", br#"[{"a":"x"}]"#, RecordFormat::Json)
            .unwrap();
        loader.store_version("users", &out2.version).unwrap();

        let versions = loader.load_versions("users").unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].id, 1);
        assert_eq!(versions[1].id, 2);
        assert!(versions.iter().all(SchemaVersion::verify_checksum));
    }

    #[test]
    fn test_restarted_writer_never_overwrites_batches() {
        let dir = tempdir().unwrap();
        let loader = DirLoader::open(&store_config(dir.path())).unwrap();

        // Each iteration is a "restart": a fresh pipeline whose sequence
        // counter begins at 0 again
        for _ in 0..2 {
            let pipeline = IngestPipeline::new(EngineConfig::default());
            let out = pipeline
                .ingest("users", br#"[{"a":1}]"#, RecordFormat::Json)
                .unwrap();
            loader.store_batch("users", &out.records).unwrap();
        }

        let mut batches: Vec<String> = fs::read_dir(dir.path().join("groups/users/batches"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        batches.sort();
        assert_eq!(
            batches,
            vec!["batch_00000000.ndjson", "batch_00000001.ndjson"]
        );
    }

    #[test]
    fn test_restore_registry_continues_lineage() {
        let dir = tempdir().unwrap();
        let loader = DirLoader::open(&store_config(dir.path())).unwrap();

        {
            let pipeline = IngestPipeline::new(EngineConfig::default());
            let out = pipeline
                .ingest("users", br#"[{"a":1}]"#, RecordFormat::Json)
                .unwrap();
            loader.store_version("users", &out.version).unwrap();
        }

        let registry = SchemaRegistry::new(EvolutionConfig::default());
        loader.restore_registry(&registry).unwrap();
        assert_eq!(registry.list_versions("users").unwrap().len(), 1);

        let decision = registry
            .resolve_batch(
                "users",
                crate::node::SchemaNode::infer(&serde_json::json!({"a": "x"})),
                1,
            )
            .unwrap();
        assert_eq!(decision.version.id, 2);
    }

    #[test]
    fn test_checksums_file_lists_versions() {
        let dir = tempdir().unwrap();
        let loader = DirLoader::open(&store_config(dir.path())).unwrap();

        let pipeline = IngestPipeline::new(EngineConfig::default());
        let out = pipeline
            .ingest("users", br#"[{"a":1}]"#, RecordFormat::Json)
            .unwrap();
        loader.store_version("users", &out.version).unwrap();

        let checksums =
            fs::read_to_string(dir.path().join("groups/users/checksums.sha256")).unwrap();
        assert!(checksums.contains("versions/v1.json"));
        assert!(checksums.contains(out.version.checksum.as_str()));
    }
}
