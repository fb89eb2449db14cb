//! Deterministic feature-hashing embedder.
//!
//! Each lower-cased alphanumeric token is hashed (FNV-1a) into one of
//! `dimensions` buckets with a hash-derived sign, and the result is
//! L2-normalized. Texts sharing most of their words land close together.
//! No model files are needed, which makes it the embedder of choice for
//! tests and for machines without the ONNX runtime.

use anyhow::Result;

use super::{l2_normalize, EmbeddingProvider, EMBEDDING_DIM};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed without the `Result` wrapper; hashing cannot fail.
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        l2_normalize(&vector)
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::vectors::cosine_similarity;

    #[test]
    fn produces_unit_vectors_of_configured_width() {
        let embedder = HashEmbedder::default();
        let v = embedder.embed("Rust is a systems programming language").unwrap();
        assert_eq!(v.len(), EMBEDDING_DIM);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn deterministic_and_case_insensitive() {
        let embedder = HashEmbedder::default();
        assert_eq!(embedder.vector("GDPR consent"), embedder.vector("gdpr, CONSENT!"));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let v = HashEmbedder::new(8).vector("  ... ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn overlapping_texts_are_similar() {
        let embedder = HashEmbedder::default();
        let a = embedder.vector("Embeddings convert text into vectors for semantic comparison.");
        let b = embedder.vector("Embeddings convert text to vectors for semantic comparison.");
        let c = embedder.vector("Quarterly revenue grew in the retail segment");
        assert!(cosine_similarity(&a, &b) > 0.8);
        assert!(cosine_similarity(&a, &c) < 0.5);
    }

    #[test]
    fn batch_matches_single() {
        let embedder = HashEmbedder::new(16);
        let batch = embedder.embed_batch(&["one two", "three"]).unwrap();
        assert_eq!(batch[0], embedder.vector("one two"));
        assert_eq!(batch[1], embedder.vector("three"));
    }
}
