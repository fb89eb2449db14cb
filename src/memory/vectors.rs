//! ID-keyed collections of unit vectors with similarity search.
//!
//! A [`VectorStore`] is a value: [`add`](VectorStore::add) and
//! [`remove`](VectorStore::remove) return a new store and leave the receiver
//! untouched. On disk a collection is two files under `embeddings/`:
//! `<collection>.vec` (a small header then little-endian `f32` rows) and
//! `<collection>.ids` (one id per line, same order).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView1, Axis};
use serde::Serialize;

use crate::error::ValidationError;
use crate::storage::guard::is_sanitized;
use crate::storage::write_atomic;

const VEC_MAGIC: &[u8; 4] = b"CVEC";
const VEC_VERSION: u32 = 1;
const HEADER_LEN: usize = 16;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorStore {
    ids: Vec<String>,
    embeddings: Array2<f32>,
}

impl Default for VectorStore {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            embeddings: Array2::zeros((0, 0)),
        }
    }
}

impl VectorStore {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Vector width, or 0 for an empty store.
    pub fn dim(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.embeddings.ncols()
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<ArrayView1<'_, f32>> {
        self.position(id).map(|row| self.embeddings.row(row))
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|existing| existing == id)
    }

    /// A store with `vector` under `id`, replacing any existing row for `id`.
    ///
    /// Vectors are stored as given; callers normalize.
    pub fn add(&self, id: &str, vector: &[f32]) -> Result<Self, ValidationError> {
        if vector.is_empty() {
            return Err(ValidationError::EmptyVector);
        }
        if !self.is_empty() && vector.len() != self.dim() {
            return Err(ValidationError::DimensionMismatch {
                expected: self.dim(),
                actual: vector.len(),
            });
        }

        if let Some(row) = self.position(id) {
            let mut embeddings = self.embeddings.clone();
            embeddings.row_mut(row).assign(&ArrayView1::from(vector));
            return Ok(Self {
                ids: self.ids.clone(),
                embeddings,
            });
        }

        let rows = self.len();
        let embeddings = Array2::from_shape_fn((rows + 1, vector.len()), |(r, c)| {
            if r < rows {
                self.embeddings[[r, c]]
            } else {
                vector[c]
            }
        });
        let mut ids = self.ids.clone();
        ids.push(id.to_string());
        Ok(Self { ids, embeddings })
    }

    /// A store without `id`. Absent ids give back an equal store.
    pub fn remove(&self, id: &str) -> Self {
        let Some(row) = self.position(id) else {
            return self.clone();
        };
        let keep: Vec<usize> = (0..self.len()).filter(|&r| r != row).collect();
        let mut ids = self.ids.clone();
        ids.remove(row);
        if ids.is_empty() {
            return Self::default();
        }
        Self {
            ids,
            embeddings: self.embeddings.select(Axis(0), &keep),
        }
    }

    /// Dot product of every stored row with `query`, in store order.
    ///
    /// A query of the wrong width scores nothing.
    pub fn similarity(&self, query: &[f32]) -> Vec<(&str, f32)> {
        if self.is_empty() {
            return Vec::new();
        }
        if query.len() != self.dim() {
            tracing::warn!(
                expected = self.dim(),
                actual = query.len(),
                "query dimension does not match collection"
            );
            return Vec::new();
        }
        let scores = self.embeddings.dot(&ArrayView1::from(query));
        self.ids
            .iter()
            .map(String::as_str)
            .zip(scores.iter().copied())
            .collect()
    }

    /// Similarity of `query` to the row stored under `id`.
    pub fn score_of(&self, id: &str, query: &[f32]) -> Option<f32> {
        let row = self.get(id)?;
        (row.len() == query.len()).then(|| row.dot(&ArrayView1::from(query)))
    }

    /// Rows scoring at least `threshold`, best first, cut to `top_k`.
    pub fn find_similar(&self, query: &[f32], threshold: f32, top_k: Option<usize>) -> Vec<VectorMatch> {
        let mut matches: Vec<VectorMatch> = self
            .similarity(query)
            .into_iter()
            .filter(|(_, score)| *score >= threshold)
            .map(|(id, score)| VectorMatch {
                id: id.to_string(),
                score,
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        if let Some(k) = top_k {
            matches.truncate(k);
        }
        matches
    }

    /// Best match regardless of threshold.
    pub fn best_match(&self, query: &[f32]) -> Option<VectorMatch> {
        self.find_similar(query, f32::NEG_INFINITY, Some(1)).pop()
    }

    /// Write `<collection>.vec` and `<collection>.ids` under `dir`.
    pub fn save(&self, dir: &Path, collection: &str) -> Result<()> {
        let (vec_path, ids_path) = collection_paths(dir, collection)?;

        let dim = self.dim();
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.len() * dim * 4);
        bytes.extend_from_slice(VEC_MAGIC);
        bytes.extend_from_slice(&VEC_VERSION.to_le_bytes());
        bytes.extend_from_slice(&u32::try_from(self.len()).context("too many vectors")?.to_le_bytes());
        bytes.extend_from_slice(&u32::try_from(dim).context("vector too wide")?.to_le_bytes());
        for value in self.embeddings.iter() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let mut ids = self.ids.join("\n");
        if !ids.is_empty() {
            ids.push('\n');
        }

        write_atomic(&vec_path, &bytes)?;
        write_atomic(&ids_path, ids.as_bytes())?;
        tracing::debug!(collection, vectors = self.len(), dim, "vector collection saved");
        Ok(())
    }

    /// Read a collection from `dir`.
    ///
    /// Missing files are an empty store. Files that disagree with each other
    /// or with their header are logged and read as empty.
    pub fn load(dir: &Path, collection: &str) -> Self {
        match Self::try_load(dir, collection) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(collection, error = %e, "vector collection unusable, reading as empty");
                Self::default()
            }
        }
    }

    /// Read a collection, failing on anything but a clean decode or a
    /// missing `.vec` file.
    pub fn try_load(dir: &Path, collection: &str) -> Result<Self> {
        let (vec_path, ids_path) = collection_paths(dir, collection)?;

        let bytes = match std::fs::read(&vec_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", vec_path.display()))
            }
        };
        let ids_raw = std::fs::read_to_string(&ids_path)
            .with_context(|| format!("failed to read {}", ids_path.display()))?;

        decode(&bytes, &ids_raw).with_context(|| format!("malformed vector collection {collection}"))
    }
}

fn collection_paths(dir: &Path, collection: &str) -> Result<(PathBuf, PathBuf)> {
    anyhow::ensure!(is_sanitized(collection), "invalid collection name: {collection}");
    Ok((
        dir.join(format!("{collection}.vec")),
        dir.join(format!("{collection}.ids")),
    ))
}

fn decode(bytes: &[u8], ids_raw: &str) -> Result<VectorStore> {
    anyhow::ensure!(bytes.len() >= HEADER_LEN, "vector file shorter than header");
    anyhow::ensure!(&bytes[..4] == VEC_MAGIC, "bad vector file magic");

    let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let version = word(4);
    anyhow::ensure!(version == VEC_VERSION, "unsupported vector file version {version}");
    let rows = word(8) as usize;
    let dim = word(12) as usize;

    let ids: Vec<String> = ids_raw
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    anyhow::ensure!(
        ids.len() == rows,
        "id list has {} entries, vector file has {rows} rows",
        ids.len()
    );
    if rows == 0 {
        return Ok(VectorStore::default());
    }

    let data = &bytes[HEADER_LEN..];
    anyhow::ensure!(data.len() == rows * dim * 4, "vector data length does not match header");
    let values: Vec<f32> = data
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let embeddings = Array2::from_shape_vec((rows, dim), values).context("bad vector shape")?;
    Ok(VectorStore { ids, embeddings })
}

/// Load a collection, apply `change`, and save the result if it differs.
///
/// A collection that exists but does not decode is left alone and reported
/// as an error; `re-embed` rebuilds it.
pub fn update_collection(
    dir: &Path,
    collection: &str,
    change: impl FnOnce(&VectorStore) -> Result<VectorStore, ValidationError>,
) -> Result<()> {
    let current = VectorStore::try_load(dir, collection)
        .context("refusing to overwrite an unreadable vector collection")?;
    let next = change(&current)?;
    if next != current {
        next.save(dir, collection)?;
    }
    Ok(())
}

/// Cosine similarity of two slices. Empty, mismatched or zero vectors give 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
