use crate::embeddings::Embedder;
use crate::error::GenerationError;
use crate::models::{RankedChunk, SearchFilters};
use crate::service::DocumentService;
use crate::traits::AnswerGenerator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const DEFAULT_TOP_K: usize = 5;
const CONTEXT_CHUNKS: usize = 3;
const PREVIEW_CHARS: usize = 150;
const FALLBACK_CONTEXT_CHARS: usize = 800;

pub const NO_RESULTS_ANSWER: &str =
    "I couldn't find any relevant information in the documents to answer your question.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    Error,
}

impl Confidence {
    pub fn from_scores(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self::Low;
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        if mean > 0.7 {
            Self::High
        } else if mean > 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub filename: String,
    pub page_number: u32,
    pub relevance_score: f64,
    pub preview: String,
}

impl Source {
    fn from_chunk(ranked: &RankedChunk) -> Self {
        Self {
            filename: ranked.chunk.filename.clone(),
            page_number: ranked.chunk.page_number,
            relevance_score: (ranked.relevance_score * 1000.0).round() / 1000.0,
            preview: preview(&ranked.chunk.content, PREVIEW_CHARS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub confidence: Confidence,
    pub chunks_found: usize,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub query: String,
    pub answer: String,
    pub sources: Vec<Source>,
}

pub struct RagPipeline {
    generator: Option<Arc<dyn AnswerGenerator>>,
    history: Mutex<HashMap<String, Vec<Exchange>>>,
}

impl RagPipeline {
    pub fn new(generator: Option<Arc<dyn AnswerGenerator>>) -> Self {
        Self {
            generator,
            history: Mutex::new(HashMap::new()),
        }
    }

    pub async fn generate_answer(&self, query: &str, chunks: &[RankedChunk]) -> Answer {
        if chunks.is_empty() {
            return Answer {
                answer: NO_RESULTS_ANSWER.to_string(),
                sources: Vec::new(),
                confidence: Confidence::Low,
                chunks_found: 0,
                conversation_id: None,
            };
        }

        let top = &chunks[..chunks.len().min(CONTEXT_CHUNKS)];
        let context = build_context(top);
        let sources: Vec<Source> = top.iter().map(Source::from_chunk).collect();
        let scores: Vec<f64> = sources.iter().map(|source| source.relevance_score).collect();

        let answer = match &self.generator {
            None => fallback_answer(&context, "AI response generation is not configured."),
            Some(generator) => match generator.generate(&answer_prompt(query, &context)).await {
                Ok(text) => {
                    info!(chars = text.len(), "generator response received");
                    text
                }
                Err(GenerationError::EmptyResponse) => {
                    warn!("generator returned an empty response");
                    fallback_answer(&context, "AI response generation returned empty.")
                }
                Err(error) => {
                    warn!(%error, "generator call failed");
                    fallback_answer(&context, "AI response generation is temporarily unavailable.")
                }
            },
        };

        Answer {
            answer,
            sources,
            confidence: Confidence::from_scores(&scores),
            chunks_found: chunks.len(),
            conversation_id: None,
        }
    }

    pub async fn process_query<E: Embedder + 'static>(
        &self,
        service: &DocumentService<E>,
        query: &str,
        conversation_id: Option<String>,
        filters: Option<SearchFilters>,
    ) -> Answer {
        let mut answer = match service.search(query.to_string(), DEFAULT_TOP_K, filters).await {
            Ok(chunks) => self.generate_answer(query, &chunks).await,
            Err(error) => {
                warn!(%error, "search failed");
                Answer {
                    answer: format!("Sorry, I encountered an error: {error}"),
                    sources: Vec::new(),
                    confidence: Confidence::Error,
                    chunks_found: 0,
                    conversation_id: None,
                }
            }
        };
        answer.conversation_id = conversation_id.clone();

        if let Some(conversation_id) = conversation_id {
            self.history
                .lock()
                .await
                .entry(conversation_id)
                .or_default()
                .push(Exchange {
                    query: query.to_string(),
                    answer: answer.answer.clone(),
                    sources: answer.sources.clone(),
                });
        }

        answer
    }

    pub async fn history(&self, conversation_id: &str) -> Vec<Exchange> {
        self.history
            .lock()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }
}

pub(crate) fn build_context(chunks: &[RankedChunk]) -> String {
    chunks
        .iter()
        .map(|ranked| {
            format!(
                "[From {}, Page {}]:\n{}",
                ranked.chunk.filename, ranked.chunk.page_number, ranked.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn answer_prompt(query: &str, context: &str) -> String {
    format!(
        "Answer the question using only the context below. Cite the document and page \
         for every fact, and say what is missing if the context is incomplete.\n\n\
         Context from documents:\n{context}\n\nQuestion: {query}\n\nAnswer:"
    )
}

fn fallback_answer(context: &str, note: &str) -> String {
    let excerpt: String = context.chars().take(FALLBACK_CONTEXT_CHARS).collect();
    format!(
        "Based on the retrieved documents:\n\n{excerpt}\n\n*Note: {note} The information above is directly from your documents.*"
    )
}

pub(crate) fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() > max_chars {
        let head: String = content.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::embeddings::SubwordHashEmbedder;
    use crate::extractor::PageText;
    use crate::models::Chunk;
    use crate::orchestrator::SearchCoordinator;
    use async_trait::async_trait;

    struct CannedGenerator(Result<String, ()>);

    #[async_trait]
    impl AnswerGenerator for CannedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            assert!(prompt.contains("Question:"));
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(GenerationError::NotConfigured),
            }
        }
    }

    fn ranked(filename: &str, page_number: u32, content: &str, score: f64) -> RankedChunk {
        RankedChunk {
            chunk: Chunk {
                id: Chunk::make_id("doc", page_number, 0),
                document_id: "doc".to_string(),
                filename: filename.to_string(),
                page_number,
                chunk_index: 0,
                content: content.to_string(),
            },
            relevance_score: score,
            vector_score: score,
            bm25_score: 0.0,
        }
    }

    #[test]
    fn confidence_bands_follow_mean_score() {
        assert_eq!(Confidence::from_scores(&[0.9, 0.8, 0.75]), Confidence::High);
        assert_eq!(Confidence::from_scores(&[0.7, 0.7]), Confidence::Medium);
        assert_eq!(Confidence::from_scores(&[0.5]), Confidence::Low);
        assert_eq!(Confidence::from_scores(&[]), Confidence::Low);
    }

    #[test]
    fn preview_truncates_on_characters() {
        assert_eq!(preview("short", 150), "short");
        assert_eq!(preview(&"é".repeat(160), 150), format!("{}...", "é".repeat(150)));
    }

    #[tokio::test]
    async fn no_chunks_yields_low_confidence_answer() {
        let pipeline = RagPipeline::new(None);
        let answer = pipeline.generate_answer("door hardware", &[]).await;

        assert_eq!(answer.answer, NO_RESULTS_ANSWER);
        assert_eq!(answer.confidence, Confidence::Low);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn generator_text_is_used_with_top_three_sources() {
        let generator: Arc<dyn AnswerGenerator> =
            Arc::new(CannedGenerator(Ok("Door D-101 is rated 90 minutes.".to_string())));
        let pipeline = RagPipeline::new(Some(generator));
        let chunks = vec![
            ranked("a.pdf", 1, "door D-101", 0.91234),
            ranked("a.pdf", 2, "door D-102", 0.8),
            ranked("b.pdf", 1, "door D-103", 0.75),
            ranked("b.pdf", 2, "door D-104", 0.1),
        ];

        let answer = pipeline.generate_answer("fire rating of D-101", &chunks).await;
        assert_eq!(answer.answer, "Door D-101 is rated 90 minutes.");
        assert_eq!(answer.sources.len(), 3);
        assert_eq!(answer.sources[0].relevance_score, 0.912);
        assert_eq!(answer.confidence, Confidence::High);
        assert_eq!(answer.chunks_found, 4);
    }

    #[tokio::test]
    async fn failing_generator_falls_back_to_context() {
        let generator: Arc<dyn AnswerGenerator> = Arc::new(CannedGenerator(Err(())));
        let pipeline = RagPipeline::new(Some(generator));
        let chunks = vec![ranked("a.pdf", 4, "Room 204 vinyl flooring", 0.55)];

        let answer = pipeline.generate_answer("room 204 floor", &chunks).await;
        assert!(answer.answer.starts_with("Based on the retrieved documents:"));
        assert!(answer.answer.contains("[From a.pdf, Page 4]"));
        assert_eq!(answer.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn process_query_records_conversation_history() {
        let mut coordinator =
            SearchCoordinator::new(EngineConfig::default(), SubwordHashEmbedder::default())
                .without_persistence();
        coordinator
            .ingest_pages("a.pdf", "a.pdf", &[PageText::new(1, "air handling unit AHU-1 on roof")])
            .expect("ingestion should succeed");
        let service = DocumentService::from_coordinator(coordinator);
        let pipeline = RagPipeline::new(None);

        let answer = pipeline
            .process_query(&service, "AHU-1 location", Some("conv-1".to_string()), None)
            .await;
        assert_eq!(answer.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(answer.sources.len(), 1);

        pipeline
            .process_query(&service, "AHU-1 capacity", Some("conv-1".to_string()), None)
            .await;
        let history = pipeline.history("conv-1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].query, "AHU-1 capacity");
        assert!(pipeline.history("other").await.is_empty());
    }
}
