//! Configuration for the ingestion engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schemaflow.toml)
//! - Environment variables (SCHEMAFLOW_*)
//!
//! ## Example config file (schemaflow.toml):
//! ```toml
//! [evolution]
//! strict = false
//! union_widening = false
//!
//! [extract]
//! csv_typed_cells = true
//! max_batch_records = 100000
//!
//! [store]
//! path = "./schemaflow-data"
//! pretty_json = true
//! include_checksums = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the ingestion engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Schema evolution policy
    #[serde(default)]
    pub evolution: EvolutionConfig,

    /// Extraction settings
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Persistence settings for the directory loader
    #[serde(default)]
    pub store: StoreConfig,
}

/// Schema evolution policy flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Forbid automatic new-version creation: an incompatible change
    /// raises a schema conflict instead of superseding the version
    #[serde(default)]
    pub strict: bool,

    /// Fold incompatible type shifts into a union on the current version
    /// instead of creating a new one
    #[serde(default)]
    pub union_widening: bool,
}

/// Extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Parse CSV cells as JSON scalars (number, bool, null) when
    /// unambiguous; disabled, every cell stays a string
    #[serde(default = "default_true")]
    pub csv_typed_cells: bool,

    /// Upper bound on records per batch; zero disables the limit
    #[serde(default)]
    pub max_batch_records: usize,
}

/// Persistence settings for the directory loader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for persisted batches and versions
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Pretty-print persisted JSON
    #[serde(default = "default_true")]
    pub pretty_json: bool,

    /// Write a checksums.sha256 file per group
    #[serde(default = "default_true")]
    pub include_checksums: bool,
}

fn default_true() -> bool {
    true
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./schemaflow-data")
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            strict: false,
            union_widening: false,
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            csv_typed_cells: true,
            max_batch_records: 0,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            pretty_json: true,
            include_checksums: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["schemaflow.toml", ".schemaflow.toml", "config/schemaflow.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "schemaflow") {
            let xdg_config = config_dir.config_dir().join("schemaflow.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Environment variables (SCHEMAFLOW_*)
        builder = builder.add_source(
            Environment::with_prefix("SCHEMAFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get the store path (resolves relative paths)
    pub fn store_path(&self) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.store.path)
        }
    }
}
