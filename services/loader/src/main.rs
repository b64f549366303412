//! Climate data loader service.
//!
//! Reads CRU TS 2.x gridded time-series files and loads them into a
//! chosen sink (flat CSV files, Postgres, or an object store), picking
//! a streamed or in-memory transfer from projected memory pressure.

mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cruts_parser::CruTsSupplier;
use grid_common::{DataSupplier, ReportEvent, Reporter};
use storage::ConsumerRegistry;
use transfer::{DataLinker, LinkerConfig, TransferMode};

#[derive(Parser, Debug)]
#[command(name = "loader")]
#[command(about = "Gridded climate time-series loader")]
struct Args {
    /// Directory containing the source files
    #[arg(short, long)]
    source: PathBuf,

    /// Source file names within the directory
    #[arg(required = true)]
    files: Vec<String>,

    /// Sink backend: flatfile, postgres, or objectstore
    #[arg(short, long, default_value = "flatfile")]
    backend: String,

    /// Store location: a directory, a database URL, or an s3://bucket URL
    /// (default: the backend's own default location)
    #[arg(long, default_value = "")]
    store: String,

    /// Record store names, overriding the titles read from the files
    #[arg(short, long)]
    names: Vec<String>,

    /// Transfer mode: push, pull, or auto
    #[arg(long, default_value = "auto", env = "LOADER_MODE")]
    mode: String,

    /// Projected memory cost per byte of source file
    #[arg(long, default_value_t = 105, env = "LOADER_COST_MULTIPLIER")]
    cost_multiplier: u64,

    /// Memory limit in bytes (0 = auto-detect)
    #[arg(long, default_value_t = 0, env = "LOADER_MEMORY_LIMIT")]
    memory_limit: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!(backend = %args.backend, "Starting climate data loader");

    let mut supplier = CruTsSupplier::new();
    supplier.set_source(args.source.clone());
    supplier.set_file_names(args.files.clone());

    let registry = ConsumerRegistry::with_defaults(config::object_store_from_env());
    let mut consumer = registry.create(&args.backend)?;
    consumer.set_store(&args.store);
    if !args.names.is_empty() {
        consumer.set_record_store_names(args.names.clone());
    }

    let linker_config = LinkerConfig {
        mode: args.mode.parse::<TransferMode>()?,
        cost_multiplier: args.cost_multiplier,
        memory_limit_bytes: args.memory_limit,
    };

    let (reporter, mut events) = Reporter::channel();
    let linker = DataLinker::new(Box::new(supplier), consumer, linker_config, reporter);
    let handle = linker.spawn();

    // The worker task holds the only reporter, so this drains until
    // the transfer ends.
    while let Some(event) = events.recv().await {
        match event {
            ReportEvent::Message(text) => info!("{}", text),
            ReportEvent::Progress { done: 0, total: 1 } => {}
            ReportEvent::Progress { done, total } => {
                info!(done, total, "progress");
            }
        }
    }

    handle.await??;
    info!("Load completed");
    Ok(())
}
