//! # Lantern CLI
//!
//! ```bash
//! lantern --config ./lantern.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lantern init` | Create the vector store database |
//! | `lantern ingest filesystem` | Ingest local files under the configured root |
//! | `lantern ingest tracker` | Ingest task-tracker items |
//! | `lantern search "<query>"` | Retrieval only: show ranked chunks |
//! | `lantern ask "<question>"` | Retrieve, assemble context, and answer |
//! | `lantern prioritize` | Rank ingested tracker tasks by urgency |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lantern::answer::Orchestrator;
use lantern::config::{load_config, Config};
use lantern::context::assemble;
use lantern::embedding::HttpEmbeddingProvider;
use lantern::error::Error;
use lantern::index::IndexManager;
use lantern::ingest::{ingest_documents, ingest_tracker, IngestReport};
use lantern::loader_fs::FsLoader;
use lantern::loader_tracker::TrackerLoader;
use lantern::models::AnswerOutcome;
use lantern::prioritize::{format_row, prioritize, to_csv, PrioritizeOptions};
use lantern::retrieve::Retriever;
use lantern::store::sqlite::SqliteStore;
use lantern::store::VectorStore;

/// Lantern — a local-first RAG assistant for your documents and tasks.
#[derive(Parser)]
#[command(
    name = "lantern",
    about = "Lantern — a local-first RAG assistant for your documents and tasks",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./lantern.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vector store database. Idempotent.
    Init,

    /// Ingest documents from a configured source.
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },

    /// Retrieval only: print the top-k chunks for a query.
    Search {
        query: String,
        /// Override the configured top_k.
        #[arg(long)]
        k: Option<usize>,
        /// Restrict to a source type (filesystem, tracker).
        #[arg(long)]
        source: Option<String>,
    },

    /// Ask a question against the ingested corpus.
    Ask { question: String },

    /// Rank ingested tracker tasks by urgency (due dates, project ends).
    Prioritize {
        /// How many tasks to display.
        #[arg(long, default_value_t = 20)]
        top: usize,
        /// Include recently completed tasks.
        #[arg(long)]
        include_completed: bool,
        /// When including completed, only those finished in the last N days.
        #[arg(long, default_value_t = 7)]
        completed_lookback_days: i64,
        /// Override today's date (YYYY-MM-DD), for reproducible reports.
        #[arg(long)]
        today: Option<String>,
        /// Rank everyone's tasks, not just the configured assignee's.
        #[arg(long)]
        all_assignees: bool,
        /// Write the full ranking to a CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum IngestSource {
    /// Walk the configured filesystem root.
    Filesystem,
    /// Pull items from the configured task tracker.
    Tracker {
        /// Stop after this many tasks.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::connect(&config.store.path).await?;
            let indexed = store.count().await?;
            println!("store ready at {}", config.store.path.display());
            println!("  indexed chunks: {}", indexed);
            store.close().await;
        }
        Commands::Ingest { source } => {
            let manager = build_manager(&config).await?;
            let report = match source {
                IngestSource::Filesystem => {
                    let fs_config = config.loaders.filesystem.as_ref().ok_or_else(|| {
                        Error::Configuration("loaders.filesystem is not configured".into())
                    })?;
                    let loader = FsLoader::new(fs_config)?;
                    ingest_documents(&manager, &config.chunking, loader).await?
                }
                IngestSource::Tracker { limit } => {
                    let mut tracker_config = config
                        .loaders
                        .tracker
                        .clone()
                        .ok_or_else(|| {
                            Error::Configuration("loaders.tracker is not configured".into())
                        })?;
                    if let Some(limit) = limit {
                        tracker_config.limit = limit;
                    }
                    let mut loader = TrackerLoader::new(&tracker_config)?;
                    ingest_tracker(&manager, &config.chunking, &mut loader).await?
                }
            };
            print_report(&report);
        }
        Commands::Search { query, k, source } => {
            let (retriever, _) = build_query_path(&config).await?;
            let filters = source.map(|s| {
                std::collections::BTreeMap::from([("source_type".to_string(), s)])
            });
            let k = k.unwrap_or(config.retrieval.top_k);
            let hits = retriever.retrieve(&query, k, filters.as_ref()).await?;

            if hits.is_empty() {
                println!("no matching chunks");
            }
            for hit in hits {
                let origin = hit
                    .chunk
                    .metadata
                    .get("origin")
                    .cloned()
                    .unwrap_or_else(|| hit.chunk.document_id.clone());
                println!("[{:>2}] {:.4}  {}", hit.rank + 1, hit.score, origin);
                println!("     {}", snippet(&hit.chunk.text));
            }
        }
        Commands::Ask { question } => {
            let (retriever, orchestrator) = build_query_path(&config).await?;
            let hits = retriever
                .retrieve(&question, config.retrieval.top_k, None)
                .await?;
            let context = assemble(&hits, config.retrieval.max_context_chars);

            match orchestrator.answer(&question, context).await? {
                AnswerOutcome::Answered(answer) => {
                    println!("{}\n", answer.text);
                    println!("Sources:");
                    for (i, citation) in answer.citations.iter().enumerate() {
                        println!("[{}] {}", i + 1, citation);
                    }
                }
                AnswerOutcome::Degraded(degraded) => {
                    println!("{}\n", degraded.explanation);
                    for (i, segment) in degraded.context.segments.iter().enumerate() {
                        println!("[{}] {}", i + 1, segment.citation);
                        println!("    {}", snippet(&segment.hit.chunk.text));
                    }
                    if degraded.context.is_empty() {
                        println!("(no relevant context found)");
                    }
                }
            }
        }
        Commands::Prioritize {
            top,
            include_completed,
            completed_lookback_days,
            today,
            all_assignees,
            csv,
        } => {
            let today = match today {
                Some(text) => chrono::NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .map_err(|_| Error::Configuration("--today must be YYYY-MM-DD".into()))?,
                None => chrono::Utc::now().date_naive(),
            };
            let assignee_gid = if all_assignees {
                None
            } else {
                config
                    .loaders
                    .tracker
                    .as_ref()
                    .and_then(|t| t.user_gid.clone())
            };

            let store = SqliteStore::connect(&config.store.path).await?;
            let options = PrioritizeOptions {
                today,
                include_completed,
                completed_lookback_days,
                assignee_gid,
            };
            let ranked = prioritize(&store, &options).await?;
            store.close().await;

            if ranked.is_empty() {
                println!("no tracker tasks to rank; run `lantern ingest tracker` first");
                return Ok(());
            }

            println!("Today: {} | tasks ranked: {}", today, ranked.len());
            for (i, row) in ranked.iter().take(top).enumerate() {
                println!("{}", format_row(i + 1, row));
            }

            if let Some(path) = csv {
                std::fs::write(&path, to_csv(&ranked))?;
                println!("wrote {}", path.display());
            }
        }
    }

    Ok(())
}

async fn build_manager(config: &Config) -> Result<IndexManager> {
    let store = Arc::new(SqliteStore::connect(&config.store.path).await?);
    let embedder = Arc::new(HttpEmbeddingProvider::new(&config.embedding)?);
    Ok(IndexManager::new(
        store,
        embedder,
        config.embedding.batch_size,
    ))
}

async fn build_query_path(config: &Config) -> Result<(Retriever, Orchestrator)> {
    let store = Arc::new(SqliteStore::connect(&config.store.path).await?);
    let embedder = Arc::new(HttpEmbeddingProvider::new(&config.embedding)?);
    let retriever = Retriever::new(store, embedder);
    let orchestrator = Orchestrator::from_config(&config.generation)?;
    Ok((retriever, orchestrator))
}

fn print_report(report: &IngestReport) {
    println!("ingest complete");
    println!("  documents indexed: {}", report.documents);
    println!("  chunks written:    {}", report.chunks_written);
    println!("  unchanged:         {}", report.unchanged);
    println!("  skipped (empty):   {}", report.skipped);
    println!("  failed:            {}", report.failed);
}

fn snippet(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let mut out: String = flat.chars().take(160).collect();
    if flat.chars().count() > 160 {
        out.push('…');
    }
    out
}
