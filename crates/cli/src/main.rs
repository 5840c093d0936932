use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use openpace_core::constants::{MAX_MESSAGE_SIZE, MAX_OBSERVATION_TEXT_LENGTH, MIN_MESSAGE_SIZE};
use openpace_core::{
    anonymize_from_env_value, ingest, parse_message, InMemoryStore, IngestConfig, IngestOutcome,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "openpace")]
#[command(about = "Import HL7 ORU^R01 device transmissions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import one or more HL7 files into the record store
    Import {
        /// HL7 files to import
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Drop patient name and date of birth (also set by OPENPACE_ANONYMIZE)
        #[arg(long)]
        anonymize: bool,
        /// Keep the normalized message text with each transmission
        #[arg(long)]
        retain_raw: bool,
    },
    /// Parse a single HL7 file and print the result without storing it
    Inspect {
        /// HL7 file to parse
        file: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Drop patient name and date of birth (also set by OPENPACE_ANONYMIZE)
        #[arg(long)]
        anonymize: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

/// Entry point for the `openpace` CLI.
///
/// # Environment Variables
/// - `OPENPACE_ANONYMIZE`: anonymize every import when truthy (`1`, `true`, `yes`, `on`)
/// - `RUST_LOG`: extra tracing directives; `openpace=info` is always added
///
/// Logs go to stderr so `inspect` output can be piped.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("openpace=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let env_anonymize = anonymize_from_env_value(std::env::var("OPENPACE_ANONYMIZE").ok())?;

    match cli.command {
        Some(Commands::Import {
            files,
            anonymize,
            retain_raw,
        }) => {
            let config = build_config(anonymize || env_anonymize, retain_raw)?;
            let store = Arc::new(InMemoryStore::new());
            let summary = import_files(Arc::clone(&store), files, config).await;

            println!(
                "Imported {} observation(s) from {} file(s), skipped {}; {} file(s) failed",
                summary.imported, summary.succeeded, summary.skipped, summary.failed
            );
            println!(
                "Store now holds {} patient(s) and {} transmission(s)",
                store.patient_count()?,
                store.transmission_count()?
            );

            if summary.succeeded == 0 {
                anyhow::bail!("no files were imported");
            }
        }
        Some(Commands::Inspect {
            file,
            format,
            anonymize,
        }) => {
            let config = build_config(anonymize || env_anonymize, false)?;
            println!("{}", inspect_file(&file, &config, format)?);
        }
        None => {
            println!("Use 'openpace --help' for commands");
        }
    }

    Ok(())
}

fn build_config(anonymize: bool, retain_raw: bool) -> anyhow::Result<IngestConfig> {
    Ok(IngestConfig::new(
        anonymize,
        MIN_MESSAGE_SIZE,
        MAX_MESSAGE_SIZE,
        MAX_OBSERVATION_TEXT_LENGTH,
        retain_raw,
    )?)
}

/// Reads an HL7 file, refusing anything over the configured size before loading it.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected.
fn read_message(path: &Path, config: &IngestConfig) -> anyhow::Result<String> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    if size > config.max_message_size() as u64 {
        anyhow::bail!(
            "{} is {} bytes, over the {} byte limit",
            path.display(),
            size,
            config.max_message_size()
        );
    }

    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn import_file(
    store: &InMemoryStore,
    path: &Path,
    config: &IngestConfig,
) -> anyhow::Result<IngestOutcome> {
    let text = read_message(path, config)?;
    let filename = path.file_name().and_then(|n| n.to_str());
    let outcome = ingest(store, &text, filename, config)
        .with_context(|| format!("failed to import {}", path.display()))?;
    Ok(outcome)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ImportSummary {
    succeeded: usize,
    failed: usize,
    imported: usize,
    skipped: usize,
}

/// Imports every file on the blocking pool, reporting results in argument order.
async fn import_files(
    store: Arc<InMemoryStore>,
    files: Vec<PathBuf>,
    config: IngestConfig,
) -> ImportSummary {
    let tasks: Vec<_> = files
        .into_iter()
        .map(|path| {
            let store = Arc::clone(&store);
            let config = config.clone();
            let worker_path = path.clone();
            let task = tokio::task::spawn_blocking(move || {
                import_file(&store, &worker_path, &config)
            });
            (path, task)
        })
        .collect();

    let mut summary = ImportSummary::default();
    for (path, task) in tasks {
        match join_import(task).await {
            Ok(outcome) => {
                summary.succeeded += 1;
                summary.imported += outcome.parsed.imported();
                summary.skipped += outcome.parsed.skipped();
                println!(
                    "{}: imported {}, skipped {} (transmission {})",
                    path.display(),
                    outcome.parsed.imported(),
                    outcome.parsed.skipped(),
                    outcome.handle
                );
                for warning in &outcome.parsed.warnings {
                    println!("  warning: {}", warning);
                }
            }
            Err(e) => {
                summary.failed += 1;
                tracing::error!("{:#}", e);
                println!("{}: failed: {:#}", path.display(), e);
            }
        }
    }

    summary
}

/// Waits for one import worker. A panicked worker is reported as a failed import.
async fn join_import(
    task: JoinHandle<anyhow::Result<IngestOutcome>>,
) -> anyhow::Result<IngestOutcome> {
    task.await.context("import worker panicked")?
}

fn inspect_file(path: &Path, config: &IngestConfig, format: OutputFormat) -> anyhow::Result<String> {
    let text = read_message(path, config)?;
    let filename = path.file_name().and_then(|n| n.to_str());
    let parsed = parse_message(&text, filename, config)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(&parsed)?,
        OutputFormat::Yaml => serde_yaml::to_string(&parsed)?,
    })
}
