//! # litharvest CLI (`lith`)
//!
//! The `lith` binary drives the collection pipeline: database
//! initialization, collection runs against the configured source, semantic
//! search over the indexed corpus, and status inspection.
//!
//! ## Usage
//!
//! ```bash
//! lith --config ./config/lith.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lith init` | Create the SQLite database and run schema migrations |
//! | `lith collect` | Discover, download, render, chunk, and index papers |
//! | `lith search "<query>"` | Semantic search with provenance |
//! | `lith status` | Document, chunk, and vector counts |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! lith init --config ./config/lith.toml
//!
//! # Collect papers matching a query
//! lith collect --query "cat:cs.CL" --limit 10
//!
//! # Force reprocessing regardless of cache state
//! lith collect --query "cat:cs.CL" --no-cache
//!
//! # Search the collection
//! lith search "attention mechanisms in long documents" --top-k 5
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use litharvest::{config, db, migrate, pipeline, search, stats};

/// litharvest — a scholarly-document collection and retrieval pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lith.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lith",
    about = "litharvest — collect, chunk, and index scholarly documents for retrieval",
    version,
    long_about = "litharvest discovers papers at a remote source, downloads and verifies them, \
    renders PDFs to markdown through an external service, filters boilerplate sections, chunks \
    under a token budget, embeds, and indexes for semantic search with full provenance."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lith.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (documents,
    /// chunks, cache_entries, vectors). Idempotent.
    Init,

    /// Run a collection pass.
    ///
    /// Queries the configured source, skips documents that are cached and
    /// verified, and pushes the rest through acquisition, rendering,
    /// filtering, chunking, and encoding. Failures are per-document; the run
    /// continues past them.
    Collect {
        /// Source query (e.g. `cat:cs.CL`). Defaults to `source.query` from config.
        #[arg(long, default_value = "")]
        query: String,

        /// Maximum number of documents to process this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Ignore the processing cache — reprocess every discovered document.
        #[arg(long)]
        no_cache: bool,

        /// Override the output directory from config.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Semantic search over the indexed collection.
    ///
    /// Embeds the query, ranks chunks by cosine similarity, and prints each
    /// hit with its document title, section path, and position.
    Search {
        /// The search query string.
        query: String,

        /// Number of results to return.
        #[arg(long, default_value_t = 10)]
        top_k: usize,

        /// Restrict results to one document (by document UUID).
        #[arg(long)]
        document: Option<String>,
    },

    /// Show collection status: document, chunk, and vector counts.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db, 2).await?;
            migrate::run_migrations(&pool).await?;
            std::fs::create_dir_all(cfg.output.dir.join("raw"))?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Collect {
            query,
            limit,
            no_cache,
            output_dir,
        } => {
            let pipeline = pipeline::Pipeline::new(cfg, output_dir).await?;
            let summary = pipeline.run(&query, limit, no_cache).await?;

            println!("Collection run complete.");
            println!("  Discovered: {}", summary.discovered);
            println!("  Skipped:    {}", summary.skipped);
            println!("  Indexed:    {}", summary.indexed);
            println!("  Failed:     {}", summary.failed);
            println!("  Chunks:     {}", summary.chunks_written);

            if summary.indexed == 0 && summary.failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Search {
            query,
            top_k,
            document,
        } => {
            search::run_search(&cfg, &query, top_k, document).await?;
        }
        Commands::Status => {
            stats::run_status(&cfg).await?;
        }
    }

    Ok(())
}
