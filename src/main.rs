//! # docindex CLI
//!
//! Command-line access to the remote chunk index.
//!
//! ## Usage
//!
//! ```bash
//! docindex --config ./config/docindex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docindex deploy` | Deploy the application package (schema) |
//! | `docindex index <file>` | Index JSON-lines chunks, replacing prior chunks |
//! | `docindex update <file>` | Apply a JSON array of partial updates |
//! | `docindex delete <id>...` | Delete every chunk of the listed documents |
//! | `docindex search "<query>"` | Ranked search |
//! | `docindex get <id>` | Fetch a document's chunks by id |

use anyhow::Result;
use clap::{Parser, Subcommand};
use docindex::commands::{self, SearchOptions};
use docindex::config::load_config;
use docindex::core::query::SearchMode;
use docindex::RemoteIndex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// docindex: keep a remote chunk index in sync and search it.
#[derive(Parser)]
#[command(
    name = "docindex",
    about = "Document chunk index synchronization and hybrid retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docindex.toml")]
    config: PathBuf,

    /// Log at info level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the application package at `engine.deployment_zip`.
    ///
    /// Safe to repeat: deploying the current package leaves existing data
    /// in place.
    Deploy,

    /// Index chunks from a JSON-lines file.
    ///
    /// Every document present in the file has its stored chunks replaced.
    /// Prints `document_id<TAB>already_existed` per document.
    Index {
        /// JSON-lines file, one chunk per line.
        file: PathBuf,
    },

    /// Apply partial updates from a JSON array of update requests.
    Update {
        file: PathBuf,
    },

    /// Delete every chunk of the given documents.
    Delete {
        #[arg(required = true)]
        document_ids: Vec<String>,
    },

    /// Search the index.
    Search {
        query: String,

        /// keyword, semantic, hybrid, or admin.
        #[arg(long, default_value = "keyword")]
        mode: SearchMode,

        /// Maximum number of hits (default: retrieval.num_returned_hits).
        #[arg(long)]
        limit: Option<usize>,

        /// Restrict to a source type. Repeatable.
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Restrict to a document set. Repeatable.
        #[arg(long = "document-set")]
        document_sets: Vec<String>,

        /// ACL entries of the searcher. Repeatable.
        #[arg(long)]
        acl: Vec<String>,

        /// Only documents updated on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Time-decay multiplier applied to retrieval.doc_time_decay.
        #[arg(long)]
        decay: Option<f64>,

        /// Hybrid blend weight in [0, 1].
        #[arg(long)]
        alpha: Option<f64>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Fetch a document's chunks by document id.
    Get {
        document_id: String,

        /// Fetch only this chunk index.
        #[arg(long)]
        chunk: Option<usize>,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(load_config(&cli.config)?);
    let index = RemoteIndex::from_config(Arc::clone(&config))?;

    match cli.command {
        Commands::Deploy => commands::run_deploy(&index).await?,
        Commands::Index { file } => commands::run_index(&index, &file).await?,
        Commands::Update { file } => commands::run_update(&index, &file).await?,
        Commands::Delete { document_ids } => commands::run_delete(&index, &document_ids).await?,
        Commands::Search {
            query,
            mode,
            limit,
            sources,
            document_sets,
            acl,
            since,
            decay,
            alpha,
            json,
        } => {
            let opts = SearchOptions {
                limit,
                sources,
                document_sets,
                acl,
                since,
                decay,
                alpha,
                json,
            };
            commands::run_search(&index, &config, &query, mode, &opts).await?;
        }
        Commands::Get {
            document_id,
            chunk,
            json,
        } => commands::run_get(&index, &document_id, chunk, json).await?,
    }

    Ok(())
}
