pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod pipeline;
pub mod service;
pub mod stores;
pub mod structured;
pub mod traits;

pub use chunking::{build_page_chunks, chunk_text};
pub use config::{Bm25Params, ChunkingConfig, EngineConfig, FusionConfig, StorageLayout};
pub use embeddings::{SubwordHashEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{GenerationError, IndexError, IngestError, PersistenceError, SearchError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use generator::{GeneratorConfig, HttpGenerator};
pub use ingest::{discover_pdf_files, generate_document_id};
pub use models::{Chunk, DocumentRecord, IngestionReport, PageRange, RankedChunk, SearchFilters};
pub use orchestrator::SearchCoordinator;
pub use persistence::SnapshotStore;
pub use pipeline::{Answer, Confidence, Exchange, RagPipeline, Source};
pub use service::DocumentService;
pub use stores::{Bm25Store, FlatVectorStore};
pub use structured::{ExtractionKind, ExtractionOutcome, StructuredExtractor};
pub use traits::{AnswerGenerator, KeywordIndex, VectorIndex};
