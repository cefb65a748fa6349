use crate::chunking::build_page_chunks;
use crate::config::{EngineConfig, FusionConfig};
use crate::embeddings::Embedder;
use crate::error::{IndexError, IngestError, PersistenceError, SearchError};
use crate::extractor::{PageText, PdfExtractor};
use crate::ingest::{file_name_of, generate_document_id, store_upload};
use crate::models::{Chunk, DocumentRecord, IngestionReport, RankedChunk, SearchFilters};
use crate::persistence::{DocumentMap, SnapshotRefs, SnapshotStore};
use crate::stores::{tokenize, Bm25Store, FlatVectorStore};
use crate::traits::{KeywordIndex, VectorIndex};
use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

pub const NO_TEXT_EXTRACTED: &str = "No text extracted from PDF";

pub struct SearchCoordinator<E: Embedder> {
    config: EngineConfig,
    embedder: E,
    vectors: FlatVectorStore,
    keyword: Bm25Store,
    chunks: Vec<Chunk>,
    documents: DocumentMap,
    snapshots: Option<SnapshotStore>,
}

impl<E: Embedder> SearchCoordinator<E> {
    pub fn new(config: EngineConfig, embedder: E) -> Self {
        let snapshots = Some(SnapshotStore::new(config.storage.clone()));
        Self {
            vectors: FlatVectorStore::new(embedder.dimensions()),
            keyword: Bm25Store::new(config.bm25),
            chunks: Vec::new(),
            documents: DocumentMap::new(),
            snapshots,
            config,
            embedder,
        }
    }

    pub fn without_persistence(mut self) -> Self {
        self.snapshots = None;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn vector_count(&self) -> usize {
        self.vectors.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn keyword_document_count(&self) -> usize {
        self.keyword.document_count()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn document(&self, document_id: &str) -> Option<&DocumentRecord> {
        self.documents.get(document_id)
    }

    pub fn list_documents(&self) -> Vec<DocumentRecord> {
        self.documents.values().cloned().collect()
    }

    pub fn load(&mut self) {
        let Some(snapshots) = &self.snapshots else {
            return;
        };
        let loaded = snapshots.load();

        if let Some(vectors) = loaded.vectors {
            if vectors.dimensions() == self.embedder.dimensions() {
                self.vectors = vectors;
            } else {
                warn!(
                    stored = vectors.dimensions(),
                    expected = self.embedder.dimensions(),
                    "ignoring vector snapshot with a different embedding dimension"
                );
            }
        }
        if let Some(chunks) = loaded.chunks {
            self.chunks = chunks;
        }
        if let Some(documents) = loaded.documents {
            self.documents = documents;
        }

        let mut rebuild_keyword = !self.chunks.is_empty();
        if let Some(keyword) = loaded.keyword {
            if keyword.document_count() == self.chunks.len() {
                self.keyword = keyword;
                rebuild_keyword = false;
            } else {
                warn!(
                    keyword_documents = keyword.document_count(),
                    chunks = self.chunks.len(),
                    "keyword snapshot is out of step with chunks"
                );
            }
        }

        if self.vectors.len() != self.chunks.len() {
            warn!(
                vectors = self.vectors.len(),
                chunks = self.chunks.len(),
                "loaded vector and chunk counts differ"
            );
        }

        if rebuild_keyword {
            info!(chunks = self.chunks.len(), "building keyword index for loaded chunks");
            self.keyword.rebuild(&self.chunks);
            self.persist();
        }
    }

    pub fn save(&self) -> Result<(), PersistenceError> {
        let Some(snapshots) = &self.snapshots else {
            return Ok(());
        };
        let keyword = self.keyword.is_built().then_some(&self.keyword);
        snapshots.save(SnapshotRefs {
            vectors: &self.vectors,
            chunks: &self.chunks,
            documents: &self.documents,
            keyword,
        })
    }

    fn persist(&self) {
        if let Err(error) = self.save() {
            warn!(%error, "failed to persist index snapshot");
        }
    }

    pub fn ingest_file(
        &mut self,
        path: &Path,
        extractor: &dyn PdfExtractor,
    ) -> Result<IngestionReport, IngestError> {
        let filename = file_name_of(path)?;
        let stored_path = match &self.snapshots {
            Some(snapshots) => store_upload(path, &snapshots.layout().uploads_dir())?,
            None => path.to_path_buf(),
        };

        let pages = match extractor.extract_pages(&stored_path) {
            Ok(pages) => pages,
            Err(error) => {
                warn!(path = %stored_path.display(), %error, "text extraction failed");
                Vec::new()
            }
        };

        self.ingest_pages(&filename, &stored_path.to_string_lossy(), &pages)
    }

    pub fn ingest_pages(
        &mut self,
        filename: &str,
        storage_path: &str,
        pages: &[PageText],
    ) -> Result<IngestionReport, IngestError> {
        let document_id = generate_document_id(filename);

        let new_chunks: Vec<Chunk> = pages
            .iter()
            .filter(|page| !page.text.trim().is_empty())
            .flat_map(|page| {
                build_page_chunks(
                    &document_id,
                    filename,
                    page.number,
                    &page.text,
                    self.config.chunking,
                )
            })
            .collect();

        if new_chunks.is_empty() {
            return Ok(IngestionReport {
                document_id,
                filename: filename.to_string(),
                chunk_count: 0,
                error: Some(NO_TEXT_EXTRACTED.to_string()),
            });
        }

        let texts: Vec<String> = new_chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts);
        if embeddings.len() != new_chunks.len() {
            return Err(IndexError::CountMismatch {
                chunks: new_chunks.len(),
                vectors: embeddings.len(),
            }
            .into());
        }

        self.vectors.add(&embeddings)?;
        let chunk_count = new_chunks.len();
        self.chunks.extend(new_chunks);
        self.keyword.rebuild(&self.chunks);

        self.documents.insert(
            document_id.clone(),
            DocumentRecord {
                document_id: document_id.clone(),
                filename: filename.to_string(),
                storage_path: storage_path.to_string(),
                chunk_count,
                ingested_at: Some(Utc::now()),
            },
        );

        self.persist();
        info!(
            filename,
            chunk_count,
            total_vectors = self.vectors.len(),
            "document indexed"
        );

        Ok(IngestionReport {
            document_id,
            filename: filename.to_string(),
            chunk_count,
            error: None,
        })
    }

    /// Filters run after the candidate cut, so fewer than `top_k` hits can come back.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<RankedChunk>, SearchError> {
        if self.vectors.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let fusion = self.config.fusion;
        let candidate_limit = top_k.saturating_mul(fusion.candidate_multiplier.max(1));

        let query_vector = self.embedder.embed(query);
        let candidates = self
            .vectors
            .search(&query_vector, candidate_limit.min(self.vectors.len()))?;

        let bm25_scores = if self.keyword.is_built() {
            self.keyword.score(&tokenize(query))
        } else {
            Vec::new()
        };

        let fused = fuse_candidates(&candidates, &bm25_scores, self.chunks.len(), &fusion);
        let results = select_ranked(&fused, &self.chunks, top_k, candidate_limit, filters);

        debug!(
            query,
            candidates = candidates.len(),
            returned = results.len(),
            "hybrid search"
        );
        Ok(results)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedCandidate {
    pub position: usize,
    pub combined_score: f64,
    pub vector_score: f64,
    pub bm25_score: f64,
}

pub fn vector_score(distance: f32) -> f64 {
    1.0 / (1.0 + distance as f64)
}

pub fn combined_score(vector_score: f64, bm25_score: f64, fusion: &FusionConfig) -> f64 {
    let keyword_part = if bm25_score > 0.0 {
        bm25_score / fusion.bm25_normalizer
    } else {
        0.0
    };
    fusion.vector_weight * vector_score + fusion.keyword_weight * keyword_part
}

pub fn fuse_candidates(
    candidates: &[(f32, usize)],
    bm25_scores: &[f64],
    chunk_count: usize,
    fusion: &FusionConfig,
) -> Vec<FusedCandidate> {
    let mut seen = HashSet::new();
    let mut fused: Vec<FusedCandidate> = candidates
        .iter()
        .filter(|(_, position)| *position < chunk_count && seen.insert(*position))
        .map(|&(distance, position)| {
            let vector_score = vector_score(distance);
            let bm25_score = bm25_scores.get(position).copied().unwrap_or(0.0);
            FusedCandidate {
                position,
                combined_score: combined_score(vector_score, bm25_score, fusion),
                vector_score,
                bm25_score,
            }
        })
        .collect();

    fused.sort_by(|left, right| right.combined_score.total_cmp(&left.combined_score));
    fused
}

pub fn select_ranked(
    fused: &[FusedCandidate],
    chunks: &[Chunk],
    top_k: usize,
    candidate_limit: usize,
    filters: Option<&SearchFilters>,
) -> Vec<RankedChunk> {
    let mut results = Vec::new();

    for candidate in fused.iter().take(candidate_limit) {
        if results.len() >= top_k {
            break;
        }
        let Some(chunk) = chunks.get(candidate.position) else {
            continue;
        };
        if let Some(filters) = filters {
            if !filters.accepts(chunk, candidate.combined_score) {
                continue;
            }
        }

        results.push(RankedChunk {
            chunk: chunk.clone(),
            relevance_score: candidate.combined_score,
            vector_score: candidate.vector_score,
            bm25_score: candidate.bm25_score,
        });
    }

    results
}
