//! Near-duplicate detection for checkpoint theses.

use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use crate::memory::vectors::VectorStore;
use crate::storage::{Storage, CHECKPOINT_COLLECTION};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    /// Similarity of the match; 0 when there is no duplicate.
    pub score: f64,
    pub matched_id: Option<String>,
}

impl DuplicateCheck {
    pub fn unique() -> Self {
        Self {
            is_duplicate: false,
            score: 0.0,
            matched_id: None,
        }
    }
}

/// Check `text` against every stored checkpoint thesis.
///
/// Without an embedder, or if embedding fails, nothing is a duplicate.
pub fn is_duplicate(
    storage: &Storage,
    embedder: Option<&dyn EmbeddingProvider>,
    text: &str,
    threshold: f64,
) -> DuplicateCheck {
    let Some(embedder) = embedder else {
        return DuplicateCheck::unique();
    };
    match embedder.embed(text) {
        Ok(query) => {
            let vectors = VectorStore::load(&storage.embeddings_dir(), CHECKPOINT_COLLECTION);
            check_against(&vectors, &query, threshold)
        }
        Err(e) => {
            tracing::warn!(error = %e, "dedup embedding failed, treating as unique");
            DuplicateCheck::unique()
        }
    }
}

/// Best match of `query` in `vectors`, reported only if it reaches `threshold`.
pub fn check_against(vectors: &VectorStore, query: &[f32], threshold: f64) -> DuplicateCheck {
    match vectors.best_match(query) {
        Some(best) if f64::from(best.score) >= threshold => {
            tracing::debug!(matched = %best.id, score = best.score, "duplicate found");
            DuplicateCheck {
                is_duplicate: true,
                score: f64::from(best.score),
                matched_id: Some(best.id),
            }
        }
        _ => DuplicateCheck::unique(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::hash::HashEmbedder;

    fn store_with(texts: &[(&str, &str)]) -> VectorStore {
        let embedder = HashEmbedder::default();
        texts.iter().fold(VectorStore::default(), |store, (id, text)| {
            store.add(id, &embedder.vector(text)).unwrap()
        })
    }

    #[test]
    fn test_paraphrase_is_duplicate() {
        let vectors = store_with(&[
            ("cp-1", "Embeddings convert text to vectors for semantic comparison."),
            ("cp-2", "Tokio schedules tasks cooperatively on worker threads."),
        ]);
        let query = HashEmbedder::default()
            .vector("Embeddings convert text into vectors for semantic comparison.");

        let check = check_against(&vectors, &query, 0.8);
        assert!(check.is_duplicate);
        assert_eq!(check.matched_id.as_deref(), Some("cp-1"));
        assert!(check.score > 0.8);
    }

    #[test]
    fn test_below_threshold_reports_zero() {
        let vectors = store_with(&[("cp-1", "Tokio schedules tasks cooperatively.")]);
        let query = HashEmbedder::default().vector("Bread needs time to proof.");

        assert_eq!(check_against(&vectors, &query, 0.8), DuplicateCheck::unique());
    }

    #[test]
    fn test_empty_store_is_unique() {
        let query = HashEmbedder::default().vector("anything");
        assert_eq!(check_against(&VectorStore::default(), &query, 0.5), DuplicateCheck::unique());
    }
}
