use crate::config::Bm25Params;
use crate::models::Chunk;
use crate::traits::KeywordIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Bm25Model {
    term_frequencies: Vec<HashMap<String, u32>>,
    doc_lengths: Vec<u32>,
    document_frequencies: HashMap<String, u32>,
    average_length: f64,
}

impl Bm25Model {
    fn build(tokenized: &[Vec<String>]) -> Self {
        let mut model = Self::default();
        let mut total_length = 0u64;

        for tokens in tokenized {
            let mut frequencies: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *frequencies.entry(token.clone()).or_insert(0) += 1;
            }
            for term in frequencies.keys() {
                *model.document_frequencies.entry(term.clone()).or_insert(0) += 1;
            }

            total_length += tokens.len() as u64;
            model.doc_lengths.push(tokens.len() as u32);
            model.term_frequencies.push(frequencies);
        }

        if !tokenized.is_empty() {
            model.average_length = total_length as f64 / tokenized.len() as f64;
        }
        model
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.doc_lengths.len() as f64;
        let df = self.document_frequencies.get(term).copied().unwrap_or(0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }
}

/// Document `i` of the model is chunk `i` of the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bm25Store {
    params: Bm25Params,
    model: Option<Bm25Model>,
}

impl Bm25Store {
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            model: None,
        }
    }
}

impl Default for Bm25Store {
    fn default() -> Self {
        Self::new(Bm25Params::default())
    }
}

impl KeywordIndex for Bm25Store {
    fn rebuild(&mut self, chunks: &[Chunk]) {
        if chunks.is_empty() {
            self.model = None;
            return;
        }

        let tokenized: Vec<Vec<String>> = chunks.iter().map(|chunk| tokenize(&chunk.content)).collect();
        self.model = Some(Bm25Model::build(&tokenized));
    }

    fn is_built(&self) -> bool {
        self.model.is_some()
    }

    fn document_count(&self) -> usize {
        self.model
            .as_ref()
            .map(|model| model.doc_lengths.len())
            .unwrap_or(0)
    }

    fn score(&self, query_tokens: &[String]) -> Vec<f64> {
        let model = match &self.model {
            Some(model) if !model.doc_lengths.is_empty() => model,
            _ => return Vec::new(),
        };

        let k1 = self.params.k1;
        let b = self.params.b;
        let mut scores = vec![0.0; model.doc_lengths.len()];

        for token in query_tokens {
            if !model.document_frequencies.contains_key(token) {
                continue;
            }
            let idf = model.idf(token);

            for (position, frequencies) in model.term_frequencies.iter().enumerate() {
                let tf = match frequencies.get(token) {
                    Some(tf) => *tf as f64,
                    None => continue,
                };
                let length_ratio = if model.average_length > 0.0 {
                    model.doc_lengths[position] as f64 / model.average_length
                } else {
                    0.0
                };
                let tf_norm = (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * length_ratio));
                scores[position] += idf * tf_norm;
            }
        }

        scores
    }
}
