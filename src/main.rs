//! config-loom CLI
//!
//! Resolves configuration chains, infers schemas from sample documents, and
//! keeps schema artifacts synchronized with live config files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config_loom::error::{ConfigError, EnvError};
use config_loom::load::{LoadOptions, load_config};
use config_loom::schema::{generate_schema, regenerate_schema};
use config_loom::watcher::{SchemaTarget, WatcherConfig, run_schema_sync, start_watcher};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-loom", version, about = "Hierarchical configuration resolution")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a configuration chain and print the filled result
    Resolve {
        /// Directory holding the configuration documents
        #[arg(long, default_value = "config")]
        config_dir: PathBuf,

        /// Configuration name (falls back to the `config` env variable)
        #[arg(long)]
        name: Option<String>,

        /// Absolute prefix for the configuration directory
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },

    /// Infer a schema from a sample document and write the artifact
    Schema {
        /// Sample document (YAML, or JSON with a .json extension)
        sample: PathBuf,

        /// Name recorded in the artifact header
        #[arg(long)]
        name: Option<String>,

        /// Artifact path (default: <sample>.schema.yaml next to the sample)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Rewrite the artifact from scratch instead of appending
        #[arg(long)]
        fresh: bool,
    },

    /// Watch sample documents and keep their schema artifacts in sync
    Watch {
        /// Documents to watch
        samples: Vec<PathBuf>,

        /// Directory for the generated artifacts
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,

        /// Debounce window in milliseconds
        #[arg(long, default_value_t = 500)]
        debounce_ms: u64,
    },
}

fn read_sample(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read sample {}", path.display()))?;
    let value = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?
    } else {
        serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?
    };
    Ok(value)
}

fn artifact_name(sample: &Path, name: &Option<String>) -> String {
    name.clone().unwrap_or_else(|| {
        sample
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".to_string())
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Resolve {
            config_dir,
            name,
            base_dir,
            format,
        } => {
            let mut options = LoadOptions::new().with_config_dir(config_dir);
            if let Some(name) = name {
                options = options.with_name(name);
            }
            if let Some(base_dir) = base_dir {
                options = options.with_base_dir(base_dir);
            }

            let filled = match load_config(options).await {
                Ok(filled) => filled,
                // The one deliberate non-local-return path: a mandatory
                // variable was missing and its policy said stop the program.
                Err(ConfigError::Env(EnvError::Exit { name, message })) => {
                    if let Some(message) = message {
                        eprintln!("{}", message);
                    } else {
                        eprintln!("mandatory env variable {} is missing", name);
                    }
                    std::process::exit(1);
                }
                Err(err) => return Err(err.into()),
            };

            let rendered = match format {
                OutputFormat::Yaml => serde_yaml::to_string(&filled)?,
                OutputFormat::Json => serde_json::to_string_pretty(&filled)?,
            };
            println!("{}", rendered);
        }

        Command::Schema {
            sample,
            name,
            out,
            fresh,
        } => {
            let value = read_sample(&sample)?;
            let name = artifact_name(&sample, &name);
            let out = out.unwrap_or_else(|| sample.with_extension("schema.yaml"));
            if fresh {
                regenerate_schema(&value, &name, &out)?;
            } else {
                generate_schema(&value, &name, &out)?;
            }
            println!("{}", out.display());
        }

        Command::Watch {
            samples,
            out_dir,
            debounce_ms,
        } => {
            anyhow::ensure!(!samples.is_empty(), "no sample documents given");
            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("failed to create {}", out_dir.display()))?;

            let targets: Vec<SchemaTarget> = samples
                .iter()
                .map(|sample| {
                    let name = artifact_name(sample, &None);
                    let artifact_path = out_dir.join(format!("{}.schema.yaml", name));
                    SchemaTarget {
                        sample_path: sample.clone(),
                        name,
                        artifact_path,
                    }
                })
                .collect();

            // Seed every artifact before waiting for edits.
            for target in &targets {
                config_loom::watcher::regenerate_target(target)?;
            }

            let handle = start_watcher(
                samples,
                WatcherConfig {
                    debounce_duration: Duration::from_millis(debounce_ms),
                },
            )?;
            info!("watching {} sample document(s)", targets.len());
            run_schema_sync(handle, targets).await;
        }
    }

    Ok(())
}
