//! Research checkpoints: a question, the current thesis, and supporting notes.
//!
//! Each checkpoint is one JSON file, `checkpoints/<timestamp>_<slug>.json`;
//! the file stem is the checkpoint id. Thesis embeddings live in the
//! `checkpoints` vector collection and back the duplicate check on save.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::error::ValidationError;
use crate::memory::dedup::{check_against, DuplicateCheck};
use crate::memory::vectors::{update_collection, VectorStore};
use crate::storage::guard::{resolve_within, sanitize};
use crate::storage::{write_atomic, Storage, CHECKPOINTS_DIR, CHECKPOINT_COLLECTION};

/// Maximum slug length in a checkpoint id.
const SLUG_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub question: String,
    pub thesis: String,
    /// 0.0 to 1.0.
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// RFC 3339.
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewCheckpoint {
    pub question: String,
    pub thesis: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub open_questions: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointSummary {
    pub id: String,
    pub question: String,
    pub confidence: f64,
    pub tags: Vec<String>,
    pub created_at: String,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            id: cp.id.clone(),
            question: cp.question.clone(),
            confidence: cp.confidence,
            tags: cp.tags.clone(),
            created_at: cp.created_at.clone(),
        }
    }
}

/// Result returned from [`save_checkpoint`].
#[derive(Debug, Serialize)]
pub struct SaveCheckpointResult {
    pub saved: bool,
    /// Id of the new checkpoint when saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The duplicate that blocked the save.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<DuplicateCheck>,
    /// Whether the thesis vector was written.
    pub embedded: bool,
}

/// Save a checkpoint unless its thesis duplicates an existing one.
///
/// The duplicate check needs an embedder and is skipped when `force` is set.
/// Confidence is clamped to `0.0..=1.0`; NaN or infinity is rejected.
pub fn save_checkpoint(
    storage: &Storage,
    checkpoint: NewCheckpoint,
    embedder: Option<&dyn EmbeddingProvider>,
    dedup_threshold: f64,
    force: bool,
) -> Result<SaveCheckpointResult> {
    if !checkpoint.confidence.is_finite() {
        return Err(ValidationError::NonFiniteConfidence.into());
    }

    let thesis_vector = embedder.and_then(|embedder| match embedder.embed(&checkpoint.thesis) {
        Ok(vector) => Some(vector),
        Err(e) => {
            tracing::warn!(error = %e, "thesis embedding failed, saving without dedup");
            None
        }
    });

    if let (Some(vector), false) = (&thesis_vector, force) {
        let vectors = VectorStore::load(&storage.embeddings_dir(), CHECKPOINT_COLLECTION);
        let check = check_against(&vectors, vector, dedup_threshold);
        if check.is_duplicate {
            tracing::info!(
                matched = check.matched_id.as_deref().unwrap_or_default(),
                score = check.score,
                "checkpoint blocked as duplicate"
            );
            return Ok(SaveCheckpointResult {
                saved: false,
                id: None,
                duplicate: Some(check),
                embedded: false,
            });
        }
    }

    let confidence = checkpoint.confidence.clamp(0.0, 1.0);
    if confidence != checkpoint.confidence {
        tracing::warn!(given = checkpoint.confidence, confidence, "checkpoint confidence clamped");
    }

    let now = Utc::now();
    let id = unique_id(storage, &now, &checkpoint.question);
    let record = Checkpoint {
        id: id.clone(),
        question: checkpoint.question,
        thesis: checkpoint.thesis,
        confidence,
        evidence: checkpoint.evidence,
        open_questions: checkpoint.open_questions,
        tags: checkpoint.tags,
        created_at: now.to_rfc3339(),
    };

    let path = checkpoint_path(storage, &id)?;
    let json = serde_json::to_vec_pretty(&record).context("failed to serialize checkpoint")?;
    write_atomic(&path, &json)?;

    let embedded = match thesis_vector {
        Some(vector) => {
            match update_collection(&storage.embeddings_dir(), CHECKPOINT_COLLECTION, |store| {
                store.add(&id, &vector)
            }) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "failed to store thesis vector");
                    false
                }
            }
        }
        None => false,
    };

    tracing::info!(id = %id, embedded, "checkpoint saved");
    Ok(SaveCheckpointResult {
        saved: true,
        id: Some(id),
        duplicate: None,
        embedded,
    })
}

/// Load one checkpoint. Missing or malformed files give `None`.
pub fn load_checkpoint(storage: &Storage, id: &str) -> Option<Checkpoint> {
    let path = checkpoint_path(storage, &sanitize(id)).ok()?;
    read_checkpoint(&path)
}

/// All readable checkpoints, newest first.
pub fn list_checkpoints(storage: &Storage) -> Vec<CheckpointSummary> {
    load_all_checkpoints(storage)
        .iter()
        .map(CheckpointSummary::from)
        .collect()
}

/// Every readable checkpoint in full, newest first. Malformed files are skipped.
pub fn load_all_checkpoints(storage: &Storage) -> Vec<Checkpoint> {
    let entries = match std::fs::read_dir(storage.checkpoints_dir()) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "failed to list checkpoints");
            return Vec::new();
        }
    };

    let mut checkpoints: Vec<Checkpoint> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| read_checkpoint(&path))
        .collect();

    checkpoints.sort_by(|a, b| {
        created_key(b)
            .cmp(&created_key(a))
            .then_with(|| b.id.cmp(&a.id))
    });
    checkpoints
}

/// Delete a checkpoint file, then its thesis vector. `false` if it did not exist.
pub fn delete_checkpoint(storage: &Storage, id: &str) -> Result<bool> {
    let id = sanitize(id);
    let path = checkpoint_path(storage, &id)?;
    match std::fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("failed to delete {}", path.display())),
    }

    if let Err(e) = update_collection(&storage.embeddings_dir(), CHECKPOINT_COLLECTION, |store| {
        Ok(store.remove(&id))
    }) {
        tracing::warn!(id = %id, error = %e, "failed to remove thesis vector");
    }

    tracing::info!(id = %id, "checkpoint deleted");
    Ok(true)
}

fn read_checkpoint(path: &Path) -> Option<Checkpoint> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read checkpoint");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(cp) => Some(cp),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping malformed checkpoint");
            None
        }
    }
}

fn checkpoint_path(storage: &Storage, id: &str) -> Result<PathBuf> {
    let path = resolve_within(storage.root(), format!("{CHECKPOINTS_DIR}/{id}.json"))?;
    Ok(path)
}

fn created_key(cp: &Checkpoint) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&cp.created_at)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `<YYYYmmddTHHMMSS>_<slug>`, with a numeric suffix if that file exists.
fn unique_id(storage: &Storage, now: &DateTime<Utc>, question: &str) -> String {
    let base = format!("{}_{}", now.format("%Y%m%dT%H%M%S"), slug(question));
    let mut id = base.clone();
    let mut n = 2;
    while storage.checkpoints_dir().join(format!("{id}.json")).exists() {
        id = format!("{base}-{n}");
        n += 1;
    }
    id
}

fn slug(question: &str) -> String {
    let lowered = sanitize(question).to_lowercase();
    let cut: String = lowered.chars().take(SLUG_LEN).collect();
    let trimmed = cut.trim_end_matches('-');
    if trimmed.is_empty() {
        lowered
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KnowledgeConfig;
    use crate::embedding::hash::HashEmbedder;
    use crate::storage::open_storage;

    fn test_storage() -> (tempfile::TempDir, Storage) {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = open_storage(tmp.path(), &KnowledgeConfig::default()).unwrap();
        (tmp, storage)
    }

    fn checkpoint(question: &str, thesis: &str) -> NewCheckpoint {
        NewCheckpoint {
            question: question.into(),
            thesis: thesis.into(),
            confidence: 0.6,
            tags: vec!["research".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("How do Embeddings work?"), "how-do-embeddings-work");
        assert_eq!(slug("???"), "unnamed");
        let long = slug(&"word ".repeat(40));
        assert!(long.len() <= SLUG_LEN);
        assert!(!long.ends_with('-'));
    }

    #[test]
    fn test_save_load_round_trip() {
        let (_tmp, storage) = test_storage();
        let result = save_checkpoint(
            &storage,
            NewCheckpoint {
                evidence: vec!["paper A".into()],
                open_questions: vec!["does it scale?".into()],
                ..checkpoint("How do embeddings work?", "They map text to vectors.")
            },
            None,
            0.85,
            false,
        )
        .unwrap();
        assert!(result.saved);
        assert!(!result.embedded);

        let id = result.id.unwrap();
        assert!(id.ends_with("_how-do-embeddings-work"));
        let loaded = load_checkpoint(&storage, &id).unwrap();
        assert_eq!(loaded.thesis, "They map text to vectors.");
        assert_eq!(loaded.evidence, vec!["paper A"]);
        assert_eq!(loaded.open_questions, vec!["does it scale?"]);
        assert!(DateTime::parse_from_rfc3339(&loaded.created_at).is_ok());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let (_tmp, storage) = test_storage();
        let result = save_checkpoint(
            &storage,
            NewCheckpoint {
                confidence: 1.7,
                ..checkpoint("q", "t")
            },
            None,
            0.85,
            false,
        )
        .unwrap();
        let loaded = load_checkpoint(&storage, &result.id.unwrap()).unwrap();
        assert_eq!(loaded.confidence, 1.0);
    }

    #[test]
    fn test_non_finite_confidence_is_rejected() {
        let (_tmp, storage) = test_storage();
        for confidence in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = save_checkpoint(
                &storage,
                NewCheckpoint {
                    confidence,
                    ..checkpoint("q", "t")
                },
                None,
                0.85,
                false,
            )
            .unwrap_err();
            assert_eq!(
                err.downcast_ref::<ValidationError>(),
                Some(&ValidationError::NonFiniteConfidence)
            );
        }
        assert!(load_all_checkpoints(&storage).is_empty());
        assert_eq!(std::fs::read_dir(storage.checkpoints_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_duplicate_thesis_blocked_unless_forced() {
        let (_tmp, storage) = test_storage();
        let embedder = HashEmbedder::default();
        let first = save_checkpoint(
            &storage,
            checkpoint("What are embeddings?", "Embeddings convert text to vectors for semantic comparison."),
            Some(&embedder),
            0.8,
            false,
        )
        .unwrap();
        assert!(first.saved && first.embedded);

        let dup = checkpoint(
            "Embeddings again",
            "Embeddings convert text into vectors for semantic comparison.",
        );
        let blocked = save_checkpoint(&storage, dup.clone(), Some(&embedder), 0.8, false).unwrap();
        assert!(!blocked.saved);
        let check = blocked.duplicate.unwrap();
        assert_eq!(check.matched_id, first.id);
        assert!(check.score > 0.8);

        let forced = save_checkpoint(&storage, dup, Some(&embedder), 0.8, true).unwrap();
        assert!(forced.saved);
        assert_eq!(list_checkpoints(&storage).len(), 2);
    }

    #[test]
    fn test_same_second_same_question_gets_suffix() {
        let (_tmp, storage) = test_storage();
        let now = Utc::now();
        let a = unique_id(&storage, &now, "same question");
        std::fs::write(storage.checkpoints_dir().join(format!("{a}.json")), "{}").unwrap();
        let b = unique_id(&storage, &now, "same question");
        assert_eq!(b, format!("{a}-2"));
    }

    #[test]
    fn test_list_newest_first_and_skips_malformed() {
        let (_tmp, storage) = test_storage();
        for (id, created) in [
            ("20260101T000000_older", "2026-01-01T00:00:00+00:00"),
            ("20260301T000000_newer", "2026-03-01T00:00:00+00:00"),
        ] {
            let cp = Checkpoint {
                id: id.into(),
                question: id.into(),
                thesis: "t".into(),
                confidence: 0.5,
                evidence: vec![],
                open_questions: vec![],
                tags: vec![],
                created_at: created.into(),
            };
            let json = serde_json::to_string(&cp).unwrap();
            std::fs::write(storage.checkpoints_dir().join(format!("{id}.json")), json).unwrap();
        }
        std::fs::write(storage.checkpoints_dir().join("broken.json"), "{ nope").unwrap();

        let ids: Vec<_> = list_checkpoints(&storage).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["20260301T000000_newer", "20260101T000000_older"]);
    }

    #[test]
    fn test_delete_checkpoint() {
        let (_tmp, storage) = test_storage();
        let embedder = HashEmbedder::default();
        let id = save_checkpoint(&storage, checkpoint("q", "a thesis"), Some(&embedder), 0.85, false)
            .unwrap()
            .id
            .unwrap();

        assert!(delete_checkpoint(&storage, &id).unwrap());
        assert!(load_checkpoint(&storage, &id).is_none());
        assert!(VectorStore::load(&storage.embeddings_dir(), CHECKPOINT_COLLECTION).is_empty());
        assert!(!delete_checkpoint(&storage, &id).unwrap());
    }

    #[test]
    fn test_load_rejects_traversal() {
        let (_tmp, storage) = test_storage();
        assert!(load_checkpoint(&storage, "../index").is_none());
    }
}
