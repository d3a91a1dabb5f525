//! ragfuse CLI - Command-line interface for hybrid search and answers.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ragfuse_core::{RagConfig, RagError, SearchMode};
use ragfuse_query::{AnswerOptions, HistoryTurn};
use ragfuse_server::{
    load_documents, AskManyParams, AskParams, CollectionParams, IngestParams, RagServer,
    SearchParams, SummarizeParams, ToolResult,
};

/// ragfuse - Hybrid vector and lexical search with retrieval-augmented answers
#[derive(Parser)]
#[command(name = "ragfuse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/ragfuse/config.toml or ./ragfuse.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the config
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print tool results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a collection
    Search {
        /// Search query
        query: String,

        /// vector, fulltext or hybrid
        #[arg(short, long, default_value = "hybrid")]
        mode: SearchMode,

        /// Maximum number of results (default from config)
        #[arg(short = 'k', long)]
        limit: Option<usize>,

        /// Collection to search (default from config)
        #[arg(short, long)]
        collection: Option<String>,

        /// Vector share of the hybrid score
        #[arg(short = 'w', long)]
        vector_weight: Option<f32>,

        /// Drop vector candidates scoring below this
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// Answer one or more questions from retrieved documents
    Ask {
        /// The questions, answered in order
        #[arg(required = true)]
        questions: Vec<String>,

        /// Retrieval mode for the context
        #[arg(short, long, default_value = "hybrid")]
        mode: SearchMode,

        /// Documents retrieved as context
        #[arg(long, default_value = "5")]
        context_limit: usize,

        /// Sampling temperature
        #[arg(long, default_value = "0.7")]
        temperature: f32,

        /// Maximum answer tokens
        #[arg(long, default_value = "1024")]
        max_tokens: u32,

        /// Collection to search (default from config)
        #[arg(short, long)]
        collection: Option<String>,

        /// Previous question in the conversation (single question only)
        #[arg(long)]
        previous: Option<String>,
    },

    /// Embed stored documents that have no vector yet
    EmbedMissing {
        /// Collection to backfill (default from config)
        #[arg(short, long)]
        collection: Option<String>,
    },

    /// Summarize a text file
    Summarize {
        /// File to summarize
        path: PathBuf,

        /// Maximum summary tokens
        #[arg(long, default_value = "256")]
        max_tokens: u32,
    },

    /// Ingest a file or directory (.json, .txt, .md)
    Ingest {
        /// Path to file or directory to ingest
        path: PathBuf,

        /// Collection to ingest into (default from config)
        #[arg(short, long)]
        collection: Option<String>,

        /// Recursively process directories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Manage collections
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Enable lexical search on a collection
    Index {
        /// Collection name
        collection: String,
    },

    /// Show statistics
    Stats {
        /// Collection to get stats for (all if not specified)
        #[arg(long)]
        collection: Option<String>,
    },

    /// Initialize the database
    Init,
}

#[derive(Subcommand)]
enum CollectionAction {
    /// List all collections
    List,

    /// Create a new collection
    Create {
        /// Collection name
        name: String,

        /// Description
        #[arg(long)]
        description: Option<String>,

        /// Enable lexical search right away
        #[arg(long)]
        text_index: bool,
    },
}

fn setup_logging(verbose: bool, default_level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<RagConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => RagConfig::load(path)?,
        None => RagConfig::load_default()?,
    };
    if let Some(db) = &cli.database {
        config.database.path = db.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    setup_logging(cli.verbose, &config.log_level);
    debug!(
        "Database at {}, embedding provider {:?}",
        config.database.path.display(),
        config.embedding.provider
    );

    let json = cli.json;
    let result = match cli.command {
        Commands::Init => {
            init_database(&config).await?;
            return Ok(());
        }
        Commands::Search {
            query,
            mode,
            limit,
            collection,
            vector_weight,
            min_score,
        } => {
            let server = get_server(&config)?;
            server
                .search(SearchParams {
                    query,
                    mode: mode.as_str().to_string(),
                    limit,
                    collection,
                    vector_weight,
                    min_score,
                })
                .await
        }
        Commands::Ask {
            mut questions,
            mode,
            context_limit,
            temperature,
            max_tokens,
            collection,
            previous,
        } => {
            let server = get_server(&config)?;
            let options = AnswerOptions {
                context_limit,
                mode,
                temperature,
                max_tokens,
                collection,
            };

            if questions.len() == 1 {
                let history = previous
                    .into_iter()
                    .map(|q| HistoryTurn {
                        question: q,
                        answer: String::new(),
                    })
                    .collect();
                server
                    .ask(AskParams {
                        question: questions.remove(0),
                        history,
                        options,
                    })
                    .await
            } else if previous.is_some() {
                ToolResult::failure(
                    "Answer failed",
                    &RagError::invalid_argument("--previous applies to a single question"),
                )
            } else {
                server.ask_many(AskManyParams { questions, options }).await
            }
        }
        Commands::EmbedMissing { collection } => {
            let server = get_server(&config)?;
            server.embed_missing(collection.as_deref()).await
        }
        Commands::Summarize { path, max_tokens } => {
            let server = get_server(&config)?;
            let text = fs::read_to_string(&path)?;
            server.summarize(SummarizeParams { text, max_tokens }).await
        }
        Commands::Ingest {
            path,
            collection,
            recursive,
        } => {
            let server = get_server(&config)?;
            ingest(&server, &path, collection.as_deref(), recursive).await?
        }
        Commands::Collection { action } => {
            let server = get_server(&config)?;
            match action {
                CollectionAction::List => server.list_collections().await,
                CollectionAction::Create {
                    name,
                    description,
                    text_index,
                } => {
                    server
                        .create_collection(CollectionParams {
                            name,
                            description,
                            text_index,
                        })
                        .await
                }
            }
        }
        Commands::Index { collection } => {
            let server = get_server(&config)?;
            server.create_text_index(&collection).await
        }
        Commands::Stats { collection } => {
            let server = get_server(&config)?;
            server.stats(collection.as_deref()).await
        }
    };

    report(&result, json)?;
    Ok(())
}

fn report(result: &ToolResult, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else if result.success {
        println!("{}", result.message);
    } else {
        match result.error_code {
            Some(code) => eprintln!("Error [{}]: {}", code, result.message),
            None => eprintln!("Error: {}", result.message),
        }
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn init_database(config: &RagConfig) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = &config.database.path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let server = RagServer::from_config(config)?;
    println!("Initialized database at: {}", db_path.display());

    // The default collection is created with lexical search enabled
    let collection = &config.search.default_collection;
    let result = server
        .create_collection(CollectionParams {
            name: collection.clone(),
            description: Some("Default collection".to_string()),
            text_index: true,
        })
        .await;
    if result.success || result.error_code == Some("COLLECTION_EXISTS") {
        println!("Collection '{}' ready.", collection);
    } else {
        eprintln!("Error: {}", result.message);
    }
    Ok(())
}

fn get_server(config: &RagConfig) -> Result<RagServer, Box<dyn std::error::Error>> {
    if let Some(parent) = config.database.path.parent() {
        if !parent.exists() {
            eprintln!(
                "Database directory does not exist. Run 'ragfuse init' first, or specify a path with -d."
            );
            std::process::exit(1);
        }
    }

    Ok(RagServer::from_config(config)?)
}

async fn ingest(
    server: &RagServer,
    path: &Path,
    collection: Option<&str>,
    recursive: bool,
) -> Result<ToolResult, Box<dyn std::error::Error>> {
    let docs: Vec<IngestParams> = load_documents(path, recursive)?;
    eprintln!("Ingesting {} document(s)...", docs.len());
    Ok(server.ingest_many(collection, docs).await)
}
