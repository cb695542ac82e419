//! Blobwriter CLI (blobwriter)
//!
//! Drives partition writers against a local object store directory and
//! inspects the recovery state they leave behind.
//!
//! ## Quick Start
//!
//! ```bash
//! export BLOBWRITER_STORAGE_PATH=./data/blocks
//! export BLOBWRITER_METADATA=./data/checkpoints.db
//!
//! # Write one transaction, one message per input line
//! blobwriter ingest --partition 2 --transaction 7 --input events.log
//!
//! # Replaying the same transaction id produces the same block ids
//! blobwriter ingest --partition 2 --transaction 7 --input events.log
//!
//! # Inspect
//! blobwriter checkpoint show --partition 2
//! blobwriter blocks --partition 2
//!
//! # Commit checkpointed blocks written with commit_on_complete = false
//! blobwriter finalize --partition 2
//! ```
//!
//! ## Configuration
//!
//! - `--config` / `BLOBWRITER_CONFIG`: TOML `WriterConfig`
//! - `--storage-path` / `BLOBWRITER_STORAGE_PATH`: block storage directory (default: ./data/blocks)
//! - `--metadata` / `BLOBWRITER_METADATA`: SQLite checkpoint database (default: ./data/checkpoints.db)
//! - `RUST_LOG`: log filter directives, e.g. `blobwriter_storage=debug` (default: info); logs go to stderr
//!
//! Every `ingest` is a fresh process and therefore a partition start: the
//! partition's checkpoint is cleared before the transaction runs.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use object_store::local::LocalFileSystem;
use tracing_subscriber::EnvFilter;

use blobwriter_core::blob_name;
use blobwriter_metadata::{CheckpointStore, SqliteCheckpointStore};
use blobwriter_storage::{BlobFinalizer, BlockBackend, ObjectStoreBackend, PartitionWriter, WriterConfig};

mod config;

#[derive(Parser)]
#[command(name = "blobwriter")]
#[command(about = "Replay-safe partitioned block blob writer", long_about = None)]
struct Cli {
    /// Writer configuration file (TOML)
    #[arg(short, long, env = "BLOBWRITER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory backing the block store
    #[arg(long, env = "BLOBWRITER_STORAGE_PATH", default_value = "./data/blocks")]
    storage_path: PathBuf,

    /// SQLite checkpoint database
    #[arg(long, env = "BLOBWRITER_METADATA", default_value = "./data/checkpoints.db")]
    metadata: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write one transaction to a partition, one message per input line
    Ingest {
        /// Partition index
        #[arg(short, long)]
        partition: u32,
        /// Transaction id
        #[arg(short, long)]
        transaction: u64,
        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Print Prometheus metrics to stderr afterwards
        #[arg(long)]
        metrics: bool,
    },
    /// Checkpoint management
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
    /// Commit a partition's checkpointed blocks to its blob
    Finalize {
        /// Partition index
        #[arg(short, long)]
        partition: u32,
    },
    /// List a partition's committed block list
    Blocks {
        /// Partition index
        #[arg(short, long)]
        partition: u32,
    },
}

#[derive(Subcommand)]
enum CheckpointCommands {
    /// Show a partition's checkpoint
    Show {
        /// Partition index
        #[arg(short, long)]
        partition: u32,
    },
    /// Clear a partition's checkpoint
    Clear {
        /// Partition index
        #[arg(short, long)]
        partition: u32,
    },
}

/// Open stores shared by every command.
struct Stores {
    config: WriterConfig,
    backend: Arc<ObjectStoreBackend>,
    checkpoints: Arc<SqliteCheckpointStore>,
}

impl Stores {
    async fn open(cli: &Cli) -> Result<Self> {
        let config = config::load(cli.config.as_deref())?;

        std::fs::create_dir_all(&cli.storage_path).with_context(|| {
            format!("Failed to create storage directory {}", cli.storage_path.display())
        })?;
        let store = LocalFileSystem::new_with_prefix(&cli.storage_path)
            .context("Failed to open local object store")?;
        let backend = Arc::new(ObjectStoreBackend::new(Arc::new(store), &config));

        if let Some(parent) = cli.metadata.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let checkpoints = Arc::new(
            SqliteCheckpointStore::new(&cli.metadata, config.key_templates.clone())
                .await
                .with_context(|| format!("Failed to open checkpoint store {}", cli.metadata.display()))?,
        );

        Ok(Self {
            config,
            backend,
            checkpoints,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    blobwriter_observability::init_metrics();

    let cli = Cli::parse();
    let stores = Stores::open(&cli).await?;

    match cli.command {
        Commands::Ingest {
            partition,
            transaction,
            input,
            metrics,
        } => handle_ingest(&stores, partition, transaction, input.as_deref(), metrics).await?,
        Commands::Checkpoint { command } => handle_checkpoint_command(&stores, command).await?,
        Commands::Finalize { partition } => handle_finalize(&stores, partition).await?,
        Commands::Blocks { partition } => handle_blocks(&stores, partition).await?,
    }

    Ok(())
}

/// Split input into messages. A trailing `\r` is part of the line ending, not
/// of the message.
fn read_messages(input: Option<&Path>) -> Result<Vec<String>> {
    let text = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            text
        }
    };

    Ok(text
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect())
}

async fn handle_ingest(
    stores: &Stores,
    partition: u32,
    transaction: u64,
    input: Option<&Path>,
    print_metrics: bool,
) -> Result<()> {
    let messages = read_messages(input)?;
    tracing::debug!(partition, txid = transaction, messages = messages.len(), "Input read");

    let mut writer = PartitionWriter::open(
        partition,
        stores.config.clone(),
        stores.backend.clone(),
        stores.checkpoints.clone(),
    )
    .await
    .with_context(|| format!("Failed to open partition {}", partition))?;

    let summary = writer
        .run_transaction(transaction, &messages)
        .await
        .with_context(|| {
            format!(
                "Transaction {} on partition {} failed; replay it with the same input",
                transaction, partition
            )
        })?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if print_metrics {
        eprint!("{}", blobwriter_observability::render());
    }
    Ok(())
}

async fn handle_checkpoint_command(stores: &Stores, command: CheckpointCommands) -> Result<()> {
    match command {
        CheckpointCommands::Show { partition } => {
            match stores.checkpoints.read(partition).await? {
                Some(checkpoint) => {
                    println!("{}", serde_json::to_string_pretty(&checkpoint)?);
                }
                None => println!("No checkpoint for partition {}", partition),
            }
        }
        CheckpointCommands::Clear { partition } => {
            stores.checkpoints.clear(partition).await?;
            println!("Cleared checkpoint for partition {}", partition);
        }
    }
    Ok(())
}

async fn handle_finalize(stores: &Stores, partition: u32) -> Result<()> {
    let finalizer = BlobFinalizer::new(
        stores.backend.clone(),
        stores.checkpoints.clone(),
        stores.config.blob_prefix.clone(),
    );

    match finalizer.finalize(partition).await? {
        Some(checkpoint) => println!(
            "Committed transaction {} ({} blocks) to {}",
            checkpoint.transaction_id,
            checkpoint.block_count(),
            blob_name(&stores.config.blob_prefix, partition)
        ),
        None => println!("No checkpoint for partition {}", partition),
    }
    Ok(())
}

async fn handle_blocks(stores: &Stores, partition: u32) -> Result<()> {
    let blob = blob_name(&stores.config.blob_prefix, partition);
    let blocks = stores.backend.committed_block_list(&blob).await?;

    if blocks.is_empty() {
        println!("No committed blocks in {}", blob);
    }
    for id in blocks {
        println!("{}", id);
    }
    Ok(())
}
