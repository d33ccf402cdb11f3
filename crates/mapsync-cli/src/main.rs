//! mapsync CLI - Mapping-driven catalog synchronization.

use clap::{Parser, Subcommand};
use mapsync::core::identifier::physical_table;
use mapsync::{
    Config, MappingSpec, MysqlStore, RunContext, SchemaIntrospector, SyncEngine, SyncError,
    SyncResult, TargetStore,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mapsync")]
#[command(about = "Mapping-driven synchronization of catalog records into a commerce database")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml", env = "MAPSYNC_CONFIG")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize one source record
    Run {
        /// Mapping document (YAML, or JSON by extension)
        #[arg(short, long)]
        mapping: PathBuf,

        /// Source record (JSON)
        #[arg(short, long)]
        record: PathBuf,

        /// Source record identifier [default: the record's "id" field]
        #[arg(long)]
        record_id: Option<String>,

        /// Existing primary entity id to update instead of inserting
        #[arg(long)]
        target_id: Option<i64>,

        /// Override store ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        store_ids: Option<Vec<i64>>,

        /// Override language ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        language_ids: Option<Vec<i64>>,

        /// Override group ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        group_ids: Option<Vec<i64>>,

        /// Only write mapping-sourced values
        #[arg(long)]
        strict: bool,
    },

    /// Show the introspected schema of an entity's table
    Inspect {
        /// Entity name (without table prefix)
        entity: String,
    },

    /// Test the target database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            mapping,
            record,
            record_id,
            target_id,
            store_ids,
            language_ids,
            group_ids,
            strict,
        } => {
            let mapping = MappingSpec::load(&mapping)?;
            let record = load_record(&record)?;

            let record_id = record_id
                .or_else(|| record.get("id").map(value_text))
                .unwrap_or_default();
            if record_id.trim().is_empty() {
                return Err(SyncError::MissingRecordId);
            }

            let mut ctx = RunContext::from_config(&config, record_id)
                .with_target_id(target_id)
                .with_strict_mapping(strict || config.sync.strict_mapping);
            if let Some(ids) = store_ids {
                ctx = ctx.with_store_ids(ids);
            }
            if let Some(ids) = language_ids {
                ctx = ctx.with_language_ids(ids);
            }
            if let Some(ids) = group_ids {
                ctx = ctx.with_group_ids(ids);
            }

            let cancel = setup_signal_handler();
            let store = Arc::new(MysqlStore::new(&config.target).await?);
            let engine = SyncEngine::new(store.clone(), config.sync.clone());

            let outcome = tokio::select! {
                result = engine.run(&mapping, &record, &ctx) => result,
                _ = cancel.cancelled() => {
                    warn!("Run abandoned; writes already issued are kept");
                    Err(SyncError::Cancelled)
                }
            };
            store.close().await;
            let result = outcome?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_summary(&result);
            }
        }

        Commands::Inspect { entity } => {
            let store: Arc<dyn TargetStore> = Arc::new(MysqlStore::new(&config.target).await?);
            let table = physical_table(&config.target.table_prefix, &entity);
            let mut introspector = SchemaIntrospector::new(store.clone());
            let schema = introspector.table(&table).await;
            store.close().await;

            let schema = schema
                .ok_or_else(|| SyncError::Config(format!("Table not found: {}", table)))?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(schema.as_ref())?);
            } else {
                println!("Table {}:", schema.name);
                for column in &schema.columns {
                    let length = column
                        .max_length
                        .map(|l| format!("({})", l))
                        .unwrap_or_default();
                    let mut flags = Vec::new();
                    if schema.primary_key.contains(&column.name) {
                        flags.push("PK");
                    }
                    if column.is_auto_increment {
                        flags.push("AUTO_INCREMENT");
                    }
                    if !column.is_nullable {
                        flags.push("NOT NULL");
                    }
                    println!(
                        "  {:<32} {}{:<12} {}",
                        column.name,
                        column.data_type,
                        length,
                        flags.join(" ")
                    );
                }
            }
        }

        Commands::HealthCheck => {
            let start = Instant::now();
            let connected = MysqlStore::new(&config.target).await;
            let latency_ms = start.elapsed().as_millis();

            let error = connected.as_ref().err().map(ToString::to_string);
            if let Ok(store) = &connected {
                store.close().await;
            }
            let healthy = error.is_none();

            if cli.output_json {
                let result = json!({
                    "healthy": healthy,
                    "target_connected": healthy,
                    "target_latency_ms": latency_ms,
                    "target_error": error,
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Target (MySQL): {} ({}ms)",
                    if healthy { "OK" } else { "FAILED" },
                    latency_ms
                );
                if let Some(ref err) = error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            connected?;
        }
    }

    Ok(())
}

fn load_record(path: &Path) -> Result<Value, SyncError> {
    let content = std::fs::read_to_string(path)?;
    let record: Value = serde_json::from_str(&content)?;
    if !record.is_object() {
        return Err(SyncError::Config(format!(
            "Source record must be a JSON object: {:?}",
            path
        )));
    }
    Ok(record)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn print_summary(result: &SyncResult) {
    println!("\nSync completed!");
    println!("  Run ID: {}", result.run_id);
    println!("  Record: {}", result.record_id);
    println!("  Duration: {:.2}s", result.duration_ms as f64 / 1000.0);
    for (key, id) in &result.generated_ids {
        println!("  Generated {}: {}", key, id);
    }
    if let Some(id) = result.default_combination_id {
        println!("  Default combination: {}", id);
    }
    if !result.variants.is_empty() {
        let failed = result.variants.iter().filter(|v| v.failed.is_some()).count();
        println!(
            "  Variants: {} ({} abandoned)",
            result.variants.len(),
            failed
        );
    }
    if let Some(media) = &result.media {
        println!(
            "  Media: {} processed, {} skipped, {} failed",
            media.processed, media.skipped, media.failed
        );
    }
    if result.diagnostics.is_empty() {
        println!("  Diagnostics: none");
    } else {
        println!("  Diagnostics:");
        for diagnostic in &result.diagnostics {
            println!("    {}", diagnostic);
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel on SIGINT (Ctrl-C) or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Abandoning the run...", name);
                    token.cancel();
                }
                Err(e) => warn!("Failed to install {} handler: {}", name, e),
            }
        });
    }

    cancel_token
}

/// Cancel on Ctrl-C (Windows has no SIGTERM).
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Abandoning the run...");
            token.cancel();
        }
    });

    cancel_token
}
