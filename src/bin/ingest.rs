//! Schemaflow CLI
//!
//! Ingests files into schema groups and inspects version lineage.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use schemaflow::{
    DirLoader, EngineConfig, IngestPipeline, Loader, RecordFormat, SchemaRegistry,
};

#[derive(Parser)]
#[command(name = "schemaflow")]
#[command(about = "Infer, evolve, and normalize schemas for semi-structured records")]
struct Cli {
    /// Path to a config file (schemaflow.toml)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a file into a schema group and persist the result
    Ingest {
        /// Input file
        file: PathBuf,
        /// Schema group (defaults to the file stem)
        #[arg(short, long)]
        group: Option<String>,
        /// Record format (json, ndjson, csv); guessed from the extension
        /// when omitted
        #[arg(short, long)]
        format: Option<RecordFormat>,
    },

    /// Print the inferred schema of a file without touching any group
    Infer {
        /// Input file
        file: PathBuf,
        /// Record format; guessed from the extension when omitted
        #[arg(short, long)]
        format: Option<RecordFormat>,
    },

    /// List a group's schema versions
    Versions {
        /// Schema group
        group: String,
    },

    /// Print one schema version of a group
    Show {
        /// Schema group
        group: String,
        /// Version id
        id: u64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Ingest {
            file,
            group,
            format,
        } => {
            let group = group.unwrap_or_else(|| file_stem(&file));
            let format = resolve_format(&file, format)?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;

            let loader = DirLoader::open(&config.store)?;
            let registry = Arc::new(SchemaRegistry::new(config.evolution.clone()));
            loader.restore_registry(&registry)?;
            let pipeline = IngestPipeline::with_registry(config, registry);

            let output = pipeline.ingest(&group, &bytes, format)?;
            loader.store_batch(&group, &output.records)?;
            loader.store_version(&group, &output.version)?;

            let warning_count: usize =
                output.records.iter().map(|r| r.warnings.len()).sum();
            println!(
                "{}: {} records -> version {} ({:?}), {} warnings",
                group,
                output.records.len(),
                output.version.id,
                output.outcome,
                warning_count
            );
        }

        Commands::Infer { file, format } => {
            let format = resolve_format(&file, format)?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let records = schemaflow::extract(&bytes, format, &config.extract)?;
            if records.is_empty() {
                bail!("no records in {}", file.display());
            }
            let inferred = records
                .iter()
                .map(schemaflow::SchemaNode::infer)
                .fold(schemaflow::SchemaNode::Unknown, schemaflow::SchemaNode::join);
            println!("{}", inferred);
        }

        Commands::Versions { group } => {
            let registry = restored_registry(&config)?;
            for summary in registry.list_versions(&group)? {
                println!(
                    "v{}  {}  {} records  {}  {}",
                    summary.id,
                    summary.created_at.format("%Y-%m-%d %H:%M:%S"),
                    summary.record_count,
                    summary.root_kind,
                    summary.checksum
                );
            }
        }

        Commands::Show { group, id } => {
            let registry = restored_registry(&config)?;
            let version = registry.resolve_version(&group, id)?;
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
    }

    Ok(())
}

fn restored_registry(config: &EngineConfig) -> anyhow::Result<SchemaRegistry> {
    let loader = DirLoader::open(&config.store)?;
    let registry = SchemaRegistry::new(config.evolution.clone());
    loader.restore_registry(&registry)?;
    Ok(registry)
}

fn resolve_format(file: &PathBuf, format: Option<RecordFormat>) -> anyhow::Result<RecordFormat> {
    if let Some(format) = format {
        return Ok(format);
    }
    let ext = file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match RecordFormat::for_extension(ext) {
        Some(format) => Ok(format),
        None => bail!(
            "cannot guess record format for {}; pass --format",
            file.display()
        ),
    }
}

fn file_stem(file: &PathBuf) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "default".to_string())
}
