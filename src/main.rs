use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use minirag_core::{ChunkStore, Settings};
use minirag_rag::{IndexingReport, ResetPolicy, process_document};

mod context;
mod loader;

use context::{AppContext, default_data_dir};

#[derive(Parser)]
#[command(name = "minirag")]
#[command(about = "Chunk, index and answer questions over project documents", long_about = None)]
struct Cli {
    /// Directory holding the local chunk and vector snapshots
    #[arg(long, global = true, default_value_os_t = default_data_dir())]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load files, chunk them into a project and index the chunks
    Ingest {
        project: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Delete the project's chunks and collection first
        #[arg(long)]
        reset: bool,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Re-index the chunks already stored for a project
    Index {
        project: String,
        /// Drop and recreate the vector collection first
        #[arg(long)]
        reset: bool,
    },
    /// Show the chunks closest to a query
    Search {
        project: String,
        query: String,
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
    },
    /// Answer a question from the project's documents
    Answer {
        project: String,
        query: String,
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
    },
    /// Describe the project's vector collection
    Info { project: String },
    /// Delete the project's vector collection
    Reset { project: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let settings = Settings::from_env()?;
    let ctx = AppContext::build(settings, &cli.data_dir).await?;

    let outcome = run(&ctx, cli.command).await;
    ctx.shutdown().await?;
    outcome
}

async fn run(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest {
            project,
            files,
            reset,
            chunk_size,
            overlap,
        } => {
            let chunk_size = chunk_size.unwrap_or(ctx.settings.file_default_chunk_size);
            let overlap = overlap.unwrap_or(ctx.settings.file_default_chunk_overlap);
            ingest(ctx, &project, &files, reset, chunk_size, overlap).await
        }
        Commands::Index { project, reset } => {
            let policy = if reset {
                ResetPolicy::Collection
            } else {
                ResetPolicy::None
            };
            let report = ctx.indexer().index_project(&project, policy).await?;
            print_report(&project, &report);
            Ok(())
        }
        Commands::Search {
            project,
            query,
            top_k,
        } => {
            let hits = ctx.rag_engine()?.search(&project, &query, top_k).await?;
            if hits.is_empty() {
                println!("{}", "No matching chunks.".yellow());
            }
            for (i, hit) in hits.iter().enumerate() {
                println!("{} {}", format!("#{} ({:.4})", i + 1, hit.score).cyan(), hit.text);
            }
            Ok(())
        }
        Commands::Answer {
            project,
            query,
            top_k,
        } => {
            match ctx.rag_engine()?.answer(&project, &query, top_k).await? {
                Some(rag) => {
                    println!("{}", rag.answer);
                    tracing::debug!(prompt = %rag.full_prompt, "prompt sent");
                }
                None => println!("{}", "No relevant documents found for this query.".yellow()),
            }
            Ok(())
        }
        Commands::Info { project } => {
            let info = ctx
                .vector_store
                .collection_info(&minirag_core::collection_name(&project))
                .await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Commands::Reset { project } => {
            let name = minirag_core::collection_name(&project);
            if ctx.vector_store.delete_collection(&name).await? {
                println!("{} {}", "Deleted".green(), name);
            } else {
                println!("{} {} does not exist", "Nothing to delete:".yellow(), name);
            }
            Ok(())
        }
    }
}

async fn ingest(
    ctx: &AppContext,
    project: &str,
    files: &[PathBuf],
    reset: bool,
    chunk_size: usize,
    overlap: usize,
) -> Result<()> {
    if reset {
        ctx.indexer()
            .index_project(project, ResetPolicy::Project)
            .await?;
    }

    let mut stored = 0;
    for path in files {
        let pages = loader::load_file(path)?;
        let asset_id = loader::asset_id(path);
        let chunks = process_document(project, &asset_id, &pages, chunk_size, overlap)?;
        stored += ctx.chunk_store.insert_many(chunks).await?;
        println!("{} {}", "Chunked".green(), path.display());
    }
    println!("{} {} chunks stored", "✓".green(), stored);

    let report = ctx.indexer().index_project(project, ResetPolicy::None).await?;
    print_report(project, &report);
    Ok(())
}

fn print_report(project: &str, report: &IndexingReport) {
    println!(
        "{} project {}: {} of {} chunks indexed in {} pages",
        "✓".green(),
        project.bold(),
        report.inserted_count,
        report.total_expected,
        report.pages_fetched
    );
}
