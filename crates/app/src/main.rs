use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use docqa_core::{
    discover_pdf_files, AnswerGenerator, SubwordHashEmbedder, ChunkingConfig, DocumentService,
    EngineConfig, GeneratorConfig, HttpGenerator, PageRange, RagPipeline, SearchFilters,
    StorageLayout, StructuredExtractor,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding index snapshots and uploaded files
    #[arg(long, env = "DOCQA_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Characters per chunk
    #[arg(long, env = "DOCQA_CHUNK_SIZE", default_value_t = 1000)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, env = "DOCQA_CHUNK_OVERLAP", default_value_t = 200)]
    chunk_overlap: usize,

    /// Embedding dimension of the default embedder
    #[arg(long, env = "DOCQA_EMBEDDING_DIMENSIONS", default_value_t = 384)]
    embedding_dimensions: usize,

    /// JSON completion endpoint used for answers and extraction
    #[arg(long, env = "LLM_ENDPOINT")]
    llm_endpoint: Option<String>,

    /// Bearer token for the completion endpoint
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,
}

#[derive(Args)]
struct FilterArgs {
    /// Only return chunks from this filename
    #[arg(long)]
    document: Option<String>,

    /// Lowest page number to return
    #[arg(long)]
    page_min: Option<u32>,

    /// Highest page number to return
    #[arg(long)]
    page_max: Option<u32>,

    /// Minimum combined relevance score
    #[arg(long)]
    min_confidence: Option<f64>,
}

impl FilterArgs {
    fn into_filters(self) -> Option<SearchFilters> {
        let page_range = match (self.page_min, self.page_max) {
            (None, None) => None,
            (min, max) => Some(PageRange::new(min.unwrap_or(1), max.unwrap_or(u32::MAX))),
        };
        let filters = SearchFilters {
            document: self.document,
            page_range,
            min_confidence: self.min_confidence,
        };
        (!filters.is_empty()).then_some(filters)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a PDF, or every PDF below a folder.
    Ingest {
        /// File or folder to ingest.
        #[arg(long)]
        path: PathBuf,
    },
    /// Run hybrid search and print ranked chunks.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Answer a question from the indexed documents.
    Ask {
        #[arg(long)]
        query: String,
        /// Conversation to append the exchange to; a new one is created when omitted.
        #[arg(long)]
        conversation_id: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Extract a door schedule, room schedule or equipment list.
    Extract {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// List ingested documents.
    Documents,
}

fn build_generator(cli: &Cli) -> Option<Arc<dyn AnswerGenerator>> {
    let endpoint = cli.llm_endpoint.as_deref()?.trim();
    if endpoint.is_empty() {
        return None;
    }
    match GeneratorConfig::new(endpoint, cli.llm_api_key.clone()) {
        Ok(config) => Some(Arc::new(HttpGenerator::new(config))),
        Err(error) => {
            warn!(%error, "ignoring invalid LLM endpoint");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = EngineConfig {
        storage: StorageLayout::new(&cli.data_dir),
        chunking: ChunkingConfig::new(cli.chunk_size, cli.chunk_overlap)?,
        ..EngineConfig::default()
    };
    let embedder = SubwordHashEmbedder {
        dimensions: cli.embedding_dimensions,
    };
    let generator = build_generator(&cli);

    info!(
        version = app_version,
        data_dir = %cli.data_dir.display(),
        generator = generator.is_some(),
        started_at = %Utc::now().to_rfc3339(),
        "docqa boot"
    );

    let service = DocumentService::open(config, embedder).await?;

    match cli.command {
        Command::Ingest { path } => {
            let files = discover_pdf_files(&path);
            if files.is_empty() {
                anyhow::bail!("no pdf files found in {}", path.display());
            }

            for file in files {
                match service.ingest_file(file.clone()).await {
                    Ok(report) => {
                        if let Some(error) = &report.error {
                            warn!(path = %file.display(), %error, "nothing indexed");
                        }
                        println!("{}", serde_json::to_string(&report)?);
                    }
                    Err(error) => {
                        warn!(path = %file.display(), %error, "skipped pdf");
                    }
                }
            }

            println!(
                "{} chunks indexed at {}",
                service.chunk_count().await,
                Utc::now().to_rfc3339()
            );
        }
        Command::Search {
            query,
            top_k,
            filters,
        } => {
            let hits = service.search(query, top_k, filters.into_filters()).await?;

            for hit in hits {
                println!(
                    "score={:.4} vector={:.4} bm25={:.4} {} page={} chunk={}",
                    hit.relevance_score,
                    hit.vector_score,
                    hit.bm25_score,
                    hit.chunk.filename,
                    hit.chunk.page_number,
                    hit.chunk.id
                );
                println!("  {}", hit.chunk.content);
            }
        }
        Command::Ask {
            query,
            conversation_id,
            filters,
        } => {
            let pipeline = RagPipeline::new(generator);
            let conversation_id =
                conversation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let answer = pipeline
                .process_query(&service, &query, Some(conversation_id), filters.into_filters())
                .await;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        Command::Extract { query, top_k } => {
            let chunks = service.search(query.clone(), top_k, None).await?;
            let outcome = StructuredExtractor::new(generator)
                .extract(&query, &chunks)
                .await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Documents => {
            for record in service.list_documents().await {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
    }

    Ok(())
}
