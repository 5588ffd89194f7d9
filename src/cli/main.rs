/**
 * Parasync Command-Line Entry Point
 *
 * Opens the revision store and runs one maintenance command against it.
 */
use clap::{Parser, Subcommand};
use parasync::import::ReconciliationEngine;
use parasync::local_db::RevisionStore;
use parasync::shared::{CandidateParagraph, EngineConfig};
use parasync::sync::ConflictResolver;
use std::path::PathBuf;

/// Maintenance tool for a parasync revision store
///
/// The database path and similarity threshold can also be set with
/// PARASYNC_DB_PATH and PARASYNC_SIMILARITY_THRESHOLD. RUST_LOG sets the log
/// filter (default: info).
#[derive(Parser, Debug)]
#[command(name = "parasync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "PARASYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge conflicted paragraphs
    Resolve,

    /// Reconcile candidate paragraphs into a chapter
    Import {
        book_id: String,
        chapter: u32,
        /// JSON array of candidate paragraphs
        file: PathBuf,
        creator_id: String,
    },

    /// Print a chapter's live paragraphs
    Leaves { book_id: String, chapter: u32 },

    /// Print a book's conflict groups
    Conflicts { book_id: String },

    /// Print store statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::from_env()?,
    };
    let store = RevisionStore::open(&config).await?;

    match cli.command {
        Command::Resolve => {
            let mut resolver = ConflictResolver::with_default_mergers(store);
            let report = resolver.run_with_report().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Import {
            book_id,
            chapter,
            file,
            creator_id,
        } => {
            let text = std::fs::read_to_string(&file)?;
            let incoming: Vec<CandidateParagraph> = serde_json::from_str(&text)?;

            let engine = ReconciliationEngine::new(store, &config);
            let summary = engine.reconcile(&book_id, chapter, incoming, &creator_id).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Leaves { book_id, chapter } => {
            let leaves = store.leaves(&book_id, chapter).await?;
            println!("{}", serde_json::to_string_pretty(&leaves)?);
        }
        Command::Conflicts { book_id } => {
            let conflicts = store.history_conflicts(&book_id).await?;
            println!("{}", serde_json::to_string_pretty(&conflicts)?);
        }
        Command::Stats => {
            let stats = store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
