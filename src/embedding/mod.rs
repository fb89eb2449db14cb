//! Text-to-vector embedding capability.
//!
//! The memory engine only needs `embed(text) -> unit vector`; it never owns a
//! model. [`create_provider`] picks an implementation from configuration:
//!
//! - `"none"`: no embedder, recall and dedup run keyword-only
//! - `"hash"`: [`hash::HashEmbedder`], deterministic feature hashing
//! - `"local"`: [`local::LocalEmbeddingProvider`], all-MiniLM-L6-v2 via ONNX Runtime

pub mod hash;
pub mod local;

use std::sync::Arc;

use anyhow::Result;

/// Number of dimensions in the embedding vectors (all-MiniLM-L6-v2).
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of [`dimensions`](Self::dimensions) width.
/// All methods are synchronous and may block for seconds; async callers should
/// use `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Create the configured embedding provider, or `None` for keyword-only mode.
///
/// `"local"` fails if the model files are missing; run `cairn model download` first.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    match config.provider.as_str() {
        "none" | "" => Ok(None),
        "hash" => Ok(Some(Arc::new(hash::HashEmbedder::default()))),
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Some(Arc::new(provider)))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: none, hash, local"),
    }
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
