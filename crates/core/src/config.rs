use crate::error::IndexError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Fields are private so `overlap < chunk_size` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, IndexError> {
        if chunk_size == 0 {
            return Err(IndexError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(IndexError::InvalidConfig(format!(
                "overlap {overlap} must be smaller than chunk_size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub bm25_normalizer: f64,
    pub candidate_multiplier: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.6,
            keyword_weight: 0.4,
            bm25_normalizer: 10.0,
            candidate_multiplier: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.root.join("vectors.json")
    }

    pub fn chunks_path(&self) -> PathBuf {
        self.root.join("chunks.json")
    }

    pub fn documents_path(&self) -> PathBuf {
        self.root.join("documents_metadata.json")
    }

    pub fn keyword_index_path(&self) -> PathBuf {
        self.root.join("keyword_index.json")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("./data")
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub storage: StorageLayout,
    pub chunking: ChunkingConfig,
    pub fusion: FusionConfig,
    pub bm25: Bm25Params,
}

impl EngineConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageLayout::new(root),
            ..Self::default()
        }
    }
}
