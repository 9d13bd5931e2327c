//! # Telecom Harness CLI (`tlh`)
//!
//! The `tlh` binary drives the analysis pipeline from the command line:
//! database setup, single-file and directory ingestion, semantic search,
//! and inspection of stored results.
//!
//! ## Usage
//!
//! ```bash
//! tlh --config ./config/tlh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tlh init` | Create the SQLite database and run schema migrations |
//! | `tlh analyze <file>` | Run one log or capture file through the pipeline |
//! | `tlh ingest <dir>` | Analyze every matching file under a directory |
//! | `tlh parse <file>` | Show how each log line parses, without storing anything |
//! | `tlh search "<query>"` | Semantic search over indexed log chunks |
//! | `tlh show <id>` | Print an artifact with its analysis, chunks and activity |
//! | `tlh resolve <id> <status>` | Set the resolution status of an analysis |
//! | `tlh activities` | Print the activity log |
//!
//! Logging goes to stderr. `RUST_LOG` controls the filter; `--debug` forces
//! `debug`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use telecom_harness::{config, ingest, migrate, parse_cmd, search, show};

/// Telecom Harness: analysis pipeline for telecom device logs and packet
/// captures.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tlh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tlh",
    about = "Telecom Harness: analyze telecom device logs and packet captures",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tlh.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Analyze a single log or capture file.
    ///
    /// Waits for the pipeline to reach a terminal state and prints it.
    Analyze {
        /// Log file, or a `.pcap`/`.pcapng` capture.
        file: PathBuf,
    },

    /// Analyze every matching file under a directory.
    ///
    /// Files are selected with `[ingest] include_globs`/`exclude_globs`.
    /// Logs that fail validation are reported and skipped.
    Ingest {
        dir: PathBuf,
    },

    /// Parse a log file line by line without storing it.
    Parse {
        file: PathBuf,

        /// Print the parsed records as JSON.
        #[arg(long)]
        json: bool,

        /// Also print the chunks the segmenter would produce.
        #[arg(long)]
        chunks: bool,
    },

    /// Semantic search over indexed log chunks.
    Search {
        query: String,

        /// Maximum number of matches (defaults to `[vector_store] top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show an artifact with its analysis, chunks and activity.
    Show {
        id: i64,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Set the resolution status of an artifact's analysis.
    Resolve {
        id: i64,

        /// `pending`, `in_progress`, or `resolved`.
        status: String,
    },

    /// Print recent activity, newest first.
    Activities {
        /// Only entries for this artifact.
        #[arg(long)]
        artifact: Option<i64>,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run_command(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_command(cli: Cli) -> Result<()> {
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Analyze { file } => {
            ingest::run_analyze(&cfg, &file).await?;
        }
        Commands::Ingest { dir } => {
            ingest::run_ingest(&cfg, &dir).await?;
        }
        Commands::Parse { file, json, chunks } => {
            parse_cmd::run_parse(&cfg, &file, json, chunks)?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Show { id, json } => {
            show::run_show(&cfg, id, json).await?;
        }
        Commands::Resolve { id, status } => {
            show::run_resolve(&cfg, id, &status).await?;
        }
        Commands::Activities { artifact, limit } => {
            show::run_activities(&cfg, artifact, limit).await?;
        }
    }

    Ok(())
}
