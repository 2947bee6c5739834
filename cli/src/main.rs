//! chainview CLI — inspect and manage a derived view database.
//!
//! # Commands
//! ```
//! chainview status   --db <path>
//! chainview reset    --db <path> [--network <slug>] [--first-block <n>]
//! chainview rollback --db <path> --to <block>
//! chainview range    --db <path> [--start-time <unix>] [--end-time <unix>]
//! chainview info
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chainview_core::{
    reset_state, resolve_block_range, BlockCache, ProcessState, RecordStore, RollbackEngine,
    ViewConfig,
};
use chainview_store::SqliteStore;

#[derive(Parser)]
#[command(
    name = "chainview",
    about = "Rollback-safe derived state store — ChainView CLI",
    version
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the view database's metadata and feed position
    Status {
        /// Path to the SQLite view database
        #[arg(long, default_value = "./chainview.db")]
        db: String,
    },

    /// Wipe the view and reseed it for a reparse from the first block
    Reset {
        /// Path to the SQLite view database
        #[arg(long, default_value = "./chainview.db")]
        db: String,
        /// Network slug recorded in the metadata singleton
        #[arg(long)]
        network: Option<String>,
        /// First block of the tracked protocol
        #[arg(long)]
        first_block: Option<u64>,
    },

    /// Roll the view back so the given block is the newest processed block
    Rollback {
        /// Path to the SQLite view database
        #[arg(long, default_value = "./chainview.db")]
        db: String,
        /// Target block index (must be a processed block)
        #[arg(long)]
        to: u64,
    },

    /// Resolve a wall-clock range to the covering block-index range
    Range {
        /// Path to the SQLite view database
        #[arg(long, default_value = "./chainview.db")]
        db: String,
        /// Range start as a unix timestamp (default: the first block)
        #[arg(long)]
        start_time: Option<i64>,
        /// Range end as a unix timestamp (default: the latest processed block)
        #[arg(long)]
        end_time: Option<i64>,
        /// First block of the tracked protocol
        #[arg(long)]
        first_block: Option<u64>,
    },

    /// Show ChainView build and capability info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Status { db } => cmd_status(&db).await,
        Commands::Reset {
            db,
            network,
            first_block,
        } => cmd_reset(&db, network, first_block).await,
        Commands::Rollback { db, to } => cmd_rollback(&db, to).await,
        Commands::Range {
            db,
            start_time,
            end_time,
            first_block,
        } => cmd_range(&db, start_time, end_time, first_block).await,
        Commands::Info => cmd_info(),
    }
}

/// `RUST_LOG` wins; otherwise `info` (`debug` with --verbose).
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_status(db: &str) -> Result<()> {
    let store = open_store(db).await?;

    match store.metadata().await? {
        Some(meta) => {
            println!("Network:             {}", meta.network);
            println!("Schema version:      {}", meta.schema_version);
            println!(
                "Source version:      {}",
                meta.source_version.as_deref().unwrap_or("-")
            );
            println!("Last compiled block: {}", meta.last_compiled_block);
            println!("Updated:             {}", format_time(meta.updated_at));
        }
        None => println!("No metadata recorded (run `chainview reset` first)"),
    }

    match store.latest_block().await? {
        Some(block) => {
            println!(
                "Latest block:        {} ({})",
                block.block_index,
                format_time(block.block_time)
            );
            println!("Block hash:          {}", block.block_hash);
        }
        None => println!("Latest block:        none"),
    }

    let assets = store.assets_above(0).await?;
    println!("Tracked assets:      {}", assets.len());
    Ok(())
}

async fn cmd_reset(db: &str, network: Option<String>, first_block: Option<u64>) -> Result<()> {
    let store = open_store(db).await?;

    let mut config = ViewConfig::default();
    if let Some(network) = network {
        config.network = network;
    }
    if let Some(first_block) = first_block {
        config.first_block = first_block;
    }

    let mut state = ProcessState::new();
    let meta = reset_state(&store, &config, &mut state).await?;

    println!(
        "View reset for {} (reparse starts at block {})",
        meta.network, meta.last_compiled_block
    );
    println!("Seeded assets: {}", config.native_assets.join(", "));
    Ok(())
}

async fn cmd_rollback(db: &str, to: u64) -> Result<()> {
    let store = Arc::new(open_store(db).await?);

    // Offline maintenance: no feed process owns a position here, so the
    // engine runs against a throwaway state.
    let engine = RollbackEngine::new(store.clone(), Arc::new(BlockCache::new()));
    let mut state = ProcessState::new();
    let tip = engine.rollback(to, &mut state).await?;

    println!(
        "Rolled back to block {} ({})",
        tip.block_index,
        format_time(tip.block_time)
    );
    Ok(())
}

async fn cmd_range(
    db: &str,
    start_time: Option<i64>,
    end_time: Option<i64>,
    first_block: Option<u64>,
) -> Result<()> {
    let store = open_store(db).await?;

    let mut config = ViewConfig::default();
    if let Some(first_block) = first_block {
        config.first_block = first_block;
    }

    let mut state = ProcessState::new();
    if let Some(tip) = store.latest_block().await? {
        state.advance(tip);
    }

    let (start, end) = resolve_block_range(&store, &config, &state, start_time, end_time).await?;
    println!("Blocks {start} ..= {end}");
    Ok(())
}

fn cmd_info() -> Result<()> {
    println!("ChainView v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("  Block-scoped collections: blocks, balance changes, trades,");
    println!("                            market-cap history, transaction stats");
    println!("  Asset tracking:           embedded per-asset version history");
    println!("  Reorg rollback:           idempotent purge + rewind + hook dispatch");
    println!("  Bootstrap:                full reset with genesis asset seeding");
    println!("  Time ranges:              wall clock to block-index resolution");
    println!("  Storage backends:         memory, SQLite (feature: sqlite)");
    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn open_store(db: &str) -> Result<SqliteStore> {
    SqliteStore::open(db)
        .await
        .with_context(|| format!("open view database '{db}'"))
}

fn format_time(unix: i64) -> String {
    match chrono::DateTime::from_timestamp(unix, 0) {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => unix.to_string(),
    }
}
