//! # docsync CLI
//!
//! The `docsync` binary keeps a searchable index of a document tree in sync
//! with the filesystem and answers queries against it.
//!
//! ## Usage
//!
//! ```bash
//! docsync --config ./config/docsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsync init` | Create both SQLite databases and their schemas |
//! | `docsync sync` | One pass: integrity check, crawl, reconcile, purge |
//! | `docsync check` | Run the integrity checker |
//! | `docsync search "<query>"` | Search the index |
//! | `docsync stats` | Summarize both stores |
//! | `docsync serve` | HTTP server with background indexing |
//!
//! ## Examples
//!
//! ```bash
//! # Index ./docs once
//! docsync sync --config ./config/docsync.toml
//!
//! # See what a recovery would do without doing it
//! docsync check --dry-run
//!
//! # Serve queries and rescan on the configured interval
//! docsync serve -v
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docsync::logging::{self, Verbosity};
use docsync::{config, migrate, pipeline, search, server, stats};

/// docsync: an incremental document index that stays consistent with the
/// filesystem.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docsync",
    about = "docsync — incremental document indexing with self-healing consistency checks",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsync.toml")]
    config: PathBuf,

    /// Log debug detail to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize both databases.
    ///
    /// Creates the metadata and content SQLite files and their tables.
    /// Idempotent.
    Init,

    /// Run one indexing pass.
    ///
    /// Checks store integrity, crawls the root, indexes new and modified
    /// files, and purges entries for files that are gone.
    Sync,

    /// Compare the two stores and clear the metadata store if they diverge.
    Check {
        /// Report findings without clearing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search indexed documents.
    Search {
        /// The search query.
        query: String,

        /// Maximum number of chunks to return (default: `[retrieval].limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show counts and sizes of both stores.
    Stats,

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`. With `[index].start_indexing` the index is
    /// synced in the background, then every `rescan_interval_secs`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(Verbosity::from_flags(cli.verbose, cli.quiet));

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Databases initialized successfully.");
        }
        Commands::Sync => {
            pipeline::run_sync(&cfg).await?;
        }
        Commands::Check { dry_run } => {
            pipeline::run_check(&cfg, dry_run).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
