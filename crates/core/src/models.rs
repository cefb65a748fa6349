use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub filename: String,
    pub page_number: u32,
    pub chunk_index: usize,
    pub content: String,
}

impl Chunk {
    pub fn make_id(document_id: &str, page_number: u32, chunk_index: usize) -> String {
        format!("{document_id}_page{page_number}_chunk{chunk_index}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub filename: String,
    pub storage_path: String,
    pub chunk_count: usize,
    #[serde(default)]
    pub ingested_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub min: u32,
    pub max: u32,
}

impl PageRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, page_number: u32) -> bool {
        self.min <= page_number && page_number <= self.max
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub document: Option<String>,
    pub page_range: Option<PageRange>,
    pub min_confidence: Option<f64>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.document.is_none() && self.page_range.is_none() && self.min_confidence.is_none()
    }

    pub fn accepts(&self, chunk: &Chunk, combined_score: f64) -> bool {
        if let Some(document) = &self.document {
            if chunk.filename != *document {
                return false;
            }
        }
        if let Some(range) = &self.page_range {
            if !range.contains(chunk.page_number) {
                return false;
            }
        }
        if let Some(min_confidence) = self.min_confidence {
            if combined_score < min_confidence {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub relevance_score: f64,
    pub vector_score: f64,
    pub bm25_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub document_id: String,
    pub filename: String,
    pub chunk_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
