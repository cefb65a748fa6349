use crate::stores::tokenize;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const WORD_WEIGHT: f32 = 1.0;
const SUBWORD_WEIGHT: f32 = 0.5;

pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;

    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SubwordHashEmbedder {
    pub dimensions: usize,
}

impl Default for SubwordHashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for SubwordHashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];

        for word in tokenize(text) {
            add_feature(&mut vector, word.as_bytes(), WORD_WEIGHT);

            let padded: Vec<char> = format!("<{word}>").chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                add_feature(&mut vector, gram.as_bytes(), SUBWORD_WEIGHT);
            }
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vector.iter_mut().for_each(|value| *value /= magnitude);
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

// The top hash bit picks the sign so colliding features tend to cancel.
fn add_feature(vector: &mut [f32], feature: &[u8], weight: f32) {
    let hash = fnv1a(feature);
    let bucket = (hash % vector.len() as u64) as usize;
    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
    vector[bucket] += sign * weight;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        (**self).embed_batch(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::{SubwordHashEmbedder, Embedder};

    #[test]
    fn embedder_is_deterministic() {
        let embedder = SubwordHashEmbedder::default();
        let first = embedder.embed("Fire rated door schedule");
        let second = embedder.embed("Fire rated door schedule");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = SubwordHashEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc");
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn shared_words_are_closer_than_unrelated_text() {
        let embedder = SubwordHashEmbedder::default();
        let query = embedder.embed("boiler room");
        let related = embedder.embed("the boiler is in the plant room");
        let unrelated = embedder.embed("acoustic ceiling tiles");

        let dot = |left: &[f32], right: &[f32]| -> f32 {
            left.iter().zip(right).map(|(a, b)| a * b).sum()
        };
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn blank_text_embeds_to_zero() {
        let embedder = SubwordHashEmbedder { dimensions: 16 };
        assert!(embedder.embed(" -- ").iter().all(|value| *value == 0.0));
    }

    #[test]
    fn batch_matches_single_embeddings() {
        let embedder = SubwordHashEmbedder { dimensions: 64 };
        let texts = vec!["room 101".to_string(), "boiler room".to_string()];
        let batch = embedder.embed_batch(&texts);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("room 101"));
        assert_eq!(batch[1], embedder.embed("boiler room"));
    }
}
