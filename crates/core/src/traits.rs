use crate::error::{GenerationError, IndexError};
use crate::models::Chunk;
use async_trait::async_trait;

pub trait VectorIndex {
    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends every vector or none of them.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError>;

    fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<(f32, usize)>, IndexError>;
}

pub trait KeywordIndex {
    fn rebuild(&mut self, chunks: &[Chunk]);

    fn is_built(&self) -> bool;

    fn document_count(&self) -> usize;

    fn score(&self, query_tokens: &[String]) -> Vec<f64>;
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}
