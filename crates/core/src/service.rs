use crate::config::EngineConfig;
use crate::embeddings::Embedder;
use crate::error::{IngestError, SearchError};
use crate::extractor::{LopdfExtractor, PageText, PdfExtractor};
use crate::models::{DocumentRecord, IngestionReport, RankedChunk, SearchFilters};
use crate::orchestrator::SearchCoordinator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task;

pub struct DocumentService<E: Embedder> {
    coordinator: Arc<RwLock<SearchCoordinator<E>>>,
    extractor: Arc<dyn PdfExtractor>,
}

impl<E: Embedder> Clone for DocumentService<E> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            extractor: Arc::clone(&self.extractor),
        }
    }
}

impl<E: Embedder + 'static> DocumentService<E> {
    pub async fn open(config: EngineConfig, embedder: E) -> Result<Self, IngestError> {
        let coordinator = task::spawn_blocking(move || {
            let mut coordinator = SearchCoordinator::new(config, embedder);
            coordinator.load();
            coordinator
        })
        .await
        .map_err(|error| IngestError::Worker(error.to_string()))?;

        Ok(Self::from_coordinator(coordinator))
    }

    pub fn from_coordinator(coordinator: SearchCoordinator<E>) -> Self {
        Self {
            coordinator: Arc::new(RwLock::new(coordinator)),
            extractor: Arc::new(LopdfExtractor),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub async fn ingest_file(&self, path: PathBuf) -> Result<IngestionReport, IngestError> {
        let coordinator = Arc::clone(&self.coordinator);
        let extractor = Arc::clone(&self.extractor);

        task::spawn_blocking(move || {
            let mut guard = coordinator.blocking_write();
            guard.ingest_file(&path, extractor.as_ref())
        })
        .await
        .map_err(|error| IngestError::Worker(error.to_string()))?
    }

    pub async fn ingest_pages(
        &self,
        filename: String,
        storage_path: String,
        pages: Vec<PageText>,
    ) -> Result<IngestionReport, IngestError> {
        let coordinator = Arc::clone(&self.coordinator);

        task::spawn_blocking(move || {
            let mut guard = coordinator.blocking_write();
            guard.ingest_pages(&filename, &storage_path, &pages)
        })
        .await
        .map_err(|error| IngestError::Worker(error.to_string()))?
    }

    pub async fn search(
        &self,
        query: String,
        top_k: usize,
        filters: Option<SearchFilters>,
    ) -> Result<Vec<RankedChunk>, SearchError> {
        let coordinator = Arc::clone(&self.coordinator);

        task::spawn_blocking(move || {
            let guard = coordinator.blocking_read();
            guard.search(&query, top_k, filters.as_ref())
        })
        .await
        .map_err(|error| SearchError::Worker(error.to_string()))?
    }

    pub async fn list_documents(&self) -> Vec<DocumentRecord> {
        self.coordinator.read().await.list_documents()
    }

    pub async fn vector_count(&self) -> usize {
        self.coordinator.read().await.vector_count()
    }

    pub async fn chunk_count(&self) -> usize {
        self.coordinator.read().await.chunk_count()
    }
}
