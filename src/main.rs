//! cascadefs
//!
//! Command-line front end over a three-level cascade.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           cascadefs                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    MemFs     │───▶│  DiskCache   │───▶│     OsFs     │       │
//! │  │   (memory)   │    │ (--cache-dir)│    │ (--store-dir)│       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cascadefs::{
    CacheFs, DiskCache, DiskCacheConfig, FileMode, MemFs, MemFsConfig, OsFs, Tier,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// cascadefs - read and write files through a memory and disk cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the system of record
    #[arg(long, env = "CASCADEFS_STORE_DIR")]
    store_dir: PathBuf,

    /// Disk cache directory (a fresh temp directory when unset)
    #[arg(long, env = "CASCADEFS_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Disk cache entry lifetime in seconds
    #[arg(long, env = "CASCADEFS_TTL_SECS", default_value = "1800")]
    ttl_secs: u64,

    /// Disk cache sweep interval in seconds
    #[arg(long, env = "CASCADEFS_CHECK_INTERVAL_SECS", default_value = "60")]
    check_interval_secs: u64,

    /// Configure the memory tier for hashed lookup. Hashed lookup only
    /// takes effect once a tier is frozen, and the CLI keeps its memory
    /// tier writable for back-fill, so reads still walk the tree.
    #[arg(long, env = "CASCADEFS_HASHED_LOOKUP")]
    hashed_lookup: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a file's content to stdout
    Read { name: String },
    /// Store the content of a local file under `name`
    Write { name: String, source: PathBuf },
    /// Print a file's metadata as JSON
    Stat { name: String },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let disk = Arc::new(
        DiskCache::new(DiskCacheConfig {
            location: args.cache_dir.clone(),
            ttl: Duration::from_secs(args.ttl_secs),
            check_interval: Duration::from_secs(args.check_interval_secs),
        })
        .await
        .context("failed to open disk cache")?,
    );
    let store = OsFs::new(&args.store_dir);
    let lower = Arc::new(CacheFs::new(Arc::clone(&disk), store));
    let memory = MemFs::with_config(MemFsConfig {
        hashed_lookup: args.hashed_lookup,
        ..Default::default()
    });
    let fs = CacheFs::new(memory, Arc::clone(&lower));

    info!(
        tiers = %fs.label(),
        disk_cache = %disk.location().display(),
        "cascade ready"
    );

    let result = run(&args.command, &fs).await;

    fs.close().await;
    lower.close().await;
    disk.close().await;
    debug!(outer = ?fs.metrics(), inner = ?lower.metrics(), "fill metrics");

    result
}

async fn run(command: &Command, fs: &dyn Tier) -> anyhow::Result<()> {
    match command {
        Command::Read { name } => {
            let content = fs
                .read_file(name)
                .await
                .with_context(|| format!("failed to read {}", name))?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content)?;
            stdout.flush()?;
        }
        Command::Write { name, source } => {
            let content = tokio::fs::read(source)
                .await
                .with_context(|| format!("failed to read {}", source.display()))?;
            let size = content.len();
            fs.write_file(name, Bytes::from(content), FileMode::DEFAULT)
                .await
                .with_context(|| format!("failed to write {}", name))?;
            info!(name = %name, size, "stored file");
        }
        Command::Stat { name } => {
            let meta = fs
                .stat(name)
                .await
                .with_context(|| format!("failed to stat {}", name))?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
    }
    Ok(())
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr; stdout carries file content.
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
