use clap::{Parser, Subcommand};
use glimpse_models::{
    RemoteCaptionProvider, RemoteEmbedProvider, RemoteModelClient, RemoteNormalizeProvider,
    RemoteRerankProvider,
};
use glimpse_retriever::catalog::{MetadataStore, VectorStore};
use glimpse_retriever::config::GlimpseConfig;
use glimpse_retriever::indexing::IndexingEngine;
use glimpse_retriever::retrieval::SearchPipeline;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Index images into a searchable catalog and query it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "glimpse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index the configured dataset (resumable; already-cataloged paths are skipped)
    Index {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Search the catalog with a natural-language query
    Search {
        /// Query text
        query: String,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show catalog statistics
    Stats,
    /// Delete all catalog rows and the vector index files
    Clear {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = GlimpseConfig::load(&args.config).await?;

    match args.command {
        Commands::Index { format } => {
            let client = RemoteModelClient::new(config.remote_model_config());
            let engine = IndexingEngine::new(
                config.indexing_config(),
                Arc::new(RemoteCaptionProvider::new(client.clone())),
                Arc::new(RemoteNormalizeProvider::new(client.clone())),
                Arc::new(RemoteEmbedProvider::new(client)),
            );

            let metadata = MetadataStore::open(&config.storage.db_path).await?;
            let mut vectors = VectorStore::new(
                &config.storage.vector_path,
                config.vectors.dimension,
                config.vectors.normalize,
            );
            vectors.load().await?;

            let report = engine.run(&metadata, &mut vectors).await?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                OutputFormat::Summary => {
                    println!("Indexing complete");
                    println!("  Items found: {}", report.total_found);
                    println!("  Already indexed: {}", report.already_indexed);
                    println!("  Processed: {}", report.processed);
                    println!("  Caption failures: {}", report.caption_failures);
                    println!("  Normalize failures: {}", report.normalize_failures);
                    println!("  Failed batches: {}", report.failed_batches);
                    println!("  Checkpoints: {}", report.checkpoints);
                    println!("  Vector count: {}", vectors.size());
                }
            }
            Ok(())
        }
        Commands::Search { query, format } => {
            let client = RemoteModelClient::new(config.remote_model_config());
            let pipeline = SearchPipeline::new(
                config.retrieval_config(),
                Arc::new(RemoteNormalizeProvider::new(client.clone())),
                Arc::new(RemoteEmbedProvider::new(client.clone())),
                Arc::new(RemoteRerankProvider::new(client)),
            );

            let metadata = MetadataStore::open(&config.storage.db_path).await?;
            let mut vectors = VectorStore::new(
                &config.storage.vector_path,
                config.vectors.dimension,
                config.vectors.normalize,
            );
            vectors.load().await?;

            let hits = pipeline.search(&metadata, &vectors, &query).await?;
            metadata.close().await;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&hits)?);
                }
                OutputFormat::Summary => {
                    if hits.is_empty() {
                        println!("No results for '{query}'");
                    }
                    for hit in hits {
                        println!(
                            "{:>3}. {} | semantic {:.4} | rerank {:.4}",
                            hit.final_rank, hit.path, hit.semantic_score, hit.rerank_score
                        );
                        println!("     {}", hit.normalized_text);
                    }
                }
            }
            Ok(())
        }
        Commands::Stats => {
            let metadata = MetadataStore::open(&config.storage.db_path).await?;
            let mut vectors = VectorStore::new(
                &config.storage.vector_path,
                config.vectors.dimension,
                config.vectors.normalize,
            );
            vectors.load().await?;

            println!("Catalog statistics");
            println!("  Metadata rows: {}", metadata.count().await?);
            println!("  Indexed vectors: {}", vectors.size());
            metadata.close().await;
            Ok(())
        }
        Commands::Clear { yes } => {
            if !yes {
                anyhow::bail!("refusing to clear the catalog without --yes");
            }

            let metadata = MetadataStore::open(&config.storage.db_path).await?;
            let removed = metadata.clear_all().await?;
            metadata.close().await;

            let mut vectors = VectorStore::new(
                &config.storage.vector_path,
                config.vectors.dimension,
                config.vectors.normalize,
            );
            vectors.clear()?;

            println!("Cleared {removed} catalog rows and the vector index");
            Ok(())
        }
    }
}
