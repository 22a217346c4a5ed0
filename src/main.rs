//! docret CLI: a thin ambient driver over the library — `init`, `index`, and
//! `search`. Fetchers, the embedding/generation host, and any external tool
//! server are out of scope; this binary only talks to the core pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use docret::config::{self, Config};
use docret::embedding::OllamaEmbeddingClient;
use docret::expand::Expander;
use docret::generation::OllamaGenerationClient;
use docret::indexer::Indexer;
use docret::rerank::HttpReranker;
use docret::search::{SearchOptions, Searcher};
use docret::store::sqlite::SqliteStore;

#[derive(Parser)]
#[command(name = "docret", about = "A local markdown documentation retrieval engine", version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/docret.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema if it does not already exist
    Init,

    /// Chunk, embed, and index a directory of markdown files
    Index {
        /// Directory containing markdown files
        dir: PathBuf,

        /// Collection to index into
        #[arg(short, long, default_value = "default")]
        collection: String,

        /// Wipe the collection before indexing
        #[arg(long)]
        clear: bool,
    },

    /// Run a hybrid search against an indexed collection
    Search {
        query: String,

        /// Number of results to return
        #[arg(short = 'n', long, default_value_t = 10)]
        num_results: i64,

        /// Collection to search
        #[arg(short, long, default_value = "default")]
        collection: String,

        /// Disable the cross-encoder reranking pass
        #[arg(long)]
        no_rerank: bool,

        /// Disable query expansion
        #[arg(long)]
        no_expand: bool,

        /// Print keyword/semantic ranks and scores alongside each result
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            SqliteStore::open(&cfg, "default").await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Index { dir, collection, clear } => {
            let store = Arc::new(SqliteStore::open(&cfg, collection.clone()).await?);
            let embedder = Arc::new(OllamaEmbeddingClient::new(&cfg.embedding)?);
            let indexer = Indexer::new(store, embedder, cfg.embedding.batch_size);
            let stats = indexer.index_directory(&dir, clear).await?;
            println!(
                "Indexed {} chunks from {} files into collection '{collection}'",
                stats.chunks_indexed, stats.files_indexed
            );
        }
        Commands::Search {
            query,
            num_results,
            collection,
            no_rerank,
            no_expand,
            verbose,
        } => {
            let searcher = build_searcher(&cfg, &collection).await?;
            let options = SearchOptions {
                semantic_only: false,
                no_expand,
                no_rerank,
            };
            let results = searcher.search(&query, num_results, options).await?;
            print_results(&results, verbose);
        }
    }

    Ok(())
}

async fn build_searcher(cfg: &Config, collection: &str) -> anyhow::Result<Searcher> {
    let store = Arc::new(SqliteStore::open(cfg, collection).await?);
    let embedder = Arc::new(OllamaEmbeddingClient::new(&cfg.embedding)?);

    let expander = if cfg.generation.enabled {
        OllamaGenerationClient::new(&cfg.generation)?
            .map(|client| Expander::new(Arc::new(client), cfg.generation.num_variations))
    } else {
        None
    };

    let reranker: Option<Arc<dyn docret::rerank::Reranker>> = if cfg.rerank.enabled {
        HttpReranker::new(&cfg.rerank)?.map(|client| Arc::new(client) as Arc<dyn docret::rerank::Reranker>)
    } else {
        None
    };

    Ok(Searcher::new(store, embedder, expander, reranker, cfg.retrieval.clone()))
}

fn print_results(results: &[docret::models::SearchResult], verbose: bool) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (rank, result) in results.iter().enumerate() {
        println!("{}. {} (score {:.4})", rank + 1, result.source_url, result.score);
        if let Some(section) = &result.section {
            println!("   section: {section}");
        }
        if verbose {
            println!(
                "   keyword_rank={:?} semantic_rank={:?} id={}",
                result.keyword_rank, result.semantic_rank, result.id
            );
        }
        let preview: String = result.content.chars().take(200).collect();
        println!("   {preview}");
        println!();
    }
}
