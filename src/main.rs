//! # LexGraph CLI (`lexgraph`)
//!
//! ## Usage
//!
//! ```bash
//! lexgraph --config ./config/lexgraph.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexgraph init` | Create the SQLite database and run schema migrations |
//! | `lexgraph ingest <file>` | Ingest one legal document |
//! | `lexgraph bulk <dir>` | Ingest a directory in authority order |
//! | `lexgraph revise <id> <file>` | Add a new version of an existing document |
//! | `lexgraph get <id>` | Show a document, its versions, sections, and edges |
//! | `lexgraph search "<query>"` | Keyword search over chunks |
//! | `lexgraph graph` | List knowledge-graph edges |
//! | `lexgraph stats` | Record counts |
//! | `lexgraph export` | Dump everything as JSON |
//! | `lexgraph purge --yes` | Delete all ingested data |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use lexgraph::progress::ProgressMode;
use lexgraph::{config, export, get, graph_cmd, ingest, migrate, search, stats};

/// LexGraph CLI: ingest legal documents into a versioned store, a vector
/// index, and an authority knowledge graph.
#[derive(Parser)]
#[command(
    name = "lexgraph",
    about = "LexGraph — legal document ingestion into a versioned store, vector index, and knowledge graph",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lexgraph.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Ingest one file through capture, parse, index, and graph stages.
    ///
    /// Files already ingested (same bytes or same title) are skipped.
    Ingest {
        file: PathBuf,

        /// Corpus source (`us-code`, `ecfr`, `texas-statutes`,
        /// `austin-ordinances`). Inferred from the parent directory when
        /// omitted.
        #[arg(long)]
        source: Option<String>,
    },

    /// Ingest every matching file under a directory.
    ///
    /// Files are processed highest authority first so derivation and
    /// conflict edges can find their targets.
    Bulk {
        dir: PathBuf,

        #[arg(long)]
        source: Option<String>,
    },

    /// Ingest a file as the next version of an existing document.
    Revise {
        document_id: String,
        file: PathBuf,

        #[arg(long)]
        source: Option<String>,
    },

    /// Show a document by ID.
    Get {
        id: String,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Keyword search over indexed chunks.
    Search {
        query: String,

        /// `federal`, `state`, or `municipal`.
        #[arg(long)]
        jurisdiction: Option<String>,

        /// `constitution`, `statute`, `regulation`, or `ordinance`.
        #[arg(long)]
        authority: Option<String>,

        /// Restrict to one document ID.
        #[arg(long)]
        document: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// List knowledge-graph edges.
    Graph {
        /// Only edges touching this document's nodes.
        #[arg(long)]
        document: Option<String>,

        /// Only CONFLICTS_WITH edges.
        #[arg(long)]
        conflicts: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show record counts.
    Stats,

    /// Export all records as JSON.
    Export {
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Delete all ingested data and stored blobs.
    Purge {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let mode = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file, source } => {
            ingest::run_ingest(&cfg, &file, source.as_deref(), mode).await?;
        }
        Commands::Bulk { dir, source } => {
            ingest::run_bulk(&cfg, &dir, source.as_deref(), mode).await?;
        }
        Commands::Revise {
            document_id,
            file,
            source,
        } => {
            ingest::run_revise(&cfg, &document_id, &file, source.as_deref(), mode).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json).await?;
        }
        Commands::Search {
            query,
            jurisdiction,
            authority,
            document,
            limit,
            json,
        } => {
            search::run_search(
                &cfg,
                &query,
                jurisdiction.as_deref(),
                authority.as_deref(),
                document,
                limit,
                json,
            )
            .await?;
        }
        Commands::Graph {
            document,
            conflicts,
            json,
        } => {
            graph_cmd::run_graph(&cfg, document.as_deref(), conflicts, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
        Commands::Purge { yes } => {
            ingest::run_purge(&cfg, yes).await?;
        }
    }

    Ok(())
}
