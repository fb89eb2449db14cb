use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use super::store::{embedding_text, read_content, remove_content_file, remove_vectors};
use crate::embedding::EmbeddingProvider;
use crate::memory::checkpoints::load_all_checkpoints;
use crate::memory::types::ItemRecord;
use crate::memory::vectors::VectorStore;
use crate::storage::{Storage, CHECKPOINT_COLLECTION, GLOBAL_DIR, KNOWLEDGE_COLLECTION, SKILLS_DIR};

// ── Result types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub pruned: usize,
    pub remaining: usize,
    pub pruned_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ReembedResult {
    pub embedded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingLink {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Default, Serialize)]
pub struct IntegrityReport {
    /// Why the index file could not be read, if it could not.
    pub index_error: Option<String>,
    /// Index entries skipped as malformed.
    pub skipped_entries: usize,
    pub items: usize,
    /// Indexed items whose content file is missing or unreadable.
    pub missing_content: Vec<String>,
    /// Content files no index entry points at, relative to the root.
    pub orphan_files: Vec<String>,
    /// Knowledge vectors with no index entry.
    pub orphan_vectors: Vec<String>,
    /// Indexed items with no knowledge vector.
    pub unembedded: Vec<String>,
    pub dangling_links: Vec<DanglingLink>,
    /// Vector collections that exist but do not decode.
    pub unreadable_collections: Vec<String>,
}

impl IntegrityReport {
    /// Problems that lose or hide data. Missing vectors and dangling links
    /// are expected states and do not count.
    pub fn is_healthy(&self) -> bool {
        self.index_error.is_none()
            && self.skipped_entries == 0
            && self.missing_content.is_empty()
            && self.orphan_files.is_empty()
    }
}

// ── Age sweep ────────────────────────────────────────────────────────────────

/// Remove items created more than `max_age_days` days ago.
///
/// `max_age_days <= 0` disables pruning. Items whose creation date does not
/// parse are always kept. For each pruned item the content file is deleted
/// (failures logged), then the index is saved, then vectors are dropped.
pub fn sweep(storage: &Storage, max_age_days: i64) -> Result<SweepResult> {
    sweep_as_of(storage, max_age_days, chrono::Utc::now().date_naive())
}

/// [`sweep`] with an explicit "today".
pub fn sweep_as_of(storage: &Storage, max_age_days: i64, today: NaiveDate) -> Result<SweepResult> {
    if max_age_days <= 0 {
        return Ok(SweepResult {
            pruned: 0,
            remaining: storage.index().load_fresh().len(),
            pruned_ids: Vec::new(),
        });
    }
    let items = storage.index().load_for_update()?;

    let (expired, kept): (Vec<&ItemRecord>, Vec<&ItemRecord>) = items
        .iter()
        .partition(|item| is_expired(item, max_age_days, today));

    if expired.is_empty() {
        tracing::debug!(max_age_days, remaining = kept.len(), "sweep found nothing to prune");
        return Ok(SweepResult {
            pruned: 0,
            remaining: kept.len(),
            pruned_ids: Vec::new(),
        });
    }

    for item in &expired {
        remove_content_file(storage, &item.storage_path);
    }

    let kept: Vec<ItemRecord> = kept.into_iter().cloned().collect();
    storage.index().save(&kept)?;

    let pruned_ids: Vec<String> = expired.iter().map(|item| item.id.clone()).collect();
    let id_refs: Vec<&str> = pruned_ids.iter().map(String::as_str).collect();
    remove_vectors(storage, &id_refs);

    tracing::info!(pruned = pruned_ids.len(), remaining = kept.len(), max_age_days, "sweep finished");
    Ok(SweepResult {
        pruned: pruned_ids.len(),
        remaining: kept.len(),
        pruned_ids,
    })
}

fn is_expired(item: &ItemRecord, max_age_days: i64, today: NaiveDate) -> bool {
    match item.metadata.created_date() {
        Some(created) => (today - created).num_days() > max_age_days,
        None => {
            tracing::debug!(id = %item.id, created = %item.metadata.created, "unparseable date, keeping item");
            false
        }
    }
}

// ── Re-embedding ─────────────────────────────────────────────────────────────

/// Rebuild the knowledge collection from scratch with `embedder`.
///
/// Items are embedded in batches of `batch_size`; `progress` is called with
/// the size of each finished batch. A failed batch is logged and its items
/// are left without vectors.
pub fn reembed_items(
    storage: &Storage,
    embedder: &dyn EmbeddingProvider,
    batch_size: usize,
    mut progress: impl FnMut(usize),
) -> Result<ReembedResult> {
    let items = storage.index().load_fresh();
    let mut vectors = VectorStore::default();
    let mut embedded = 0;
    let mut failed = 0;

    for chunk in items.chunks(batch_size.max(1)) {
        let texts: Vec<String> = chunk
            .iter()
            .map(|item| {
                let body = read_content(storage, item).unwrap_or_else(|e| {
                    tracing::warn!(id = %item.id, error = %e, "embedding without body");
                    String::new()
                });
                embedding_text(item, &body)
            })
            .collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        match embedder.embed_batch(&text_refs) {
            Ok(batch) => {
                for (item, vector) in chunk.iter().zip(batch) {
                    match vectors.add(&item.id, &vector) {
                        Ok(next) => {
                            vectors = next;
                            embedded += 1;
                        }
                        Err(e) => {
                            tracing::warn!(id = %item.id, error = %e, "vector rejected");
                            failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(batch = chunk.len(), error = %e, "embedding batch failed");
                failed += chunk.len();
            }
        }
        progress(chunk.len());
    }

    vectors.save(&storage.embeddings_dir(), KNOWLEDGE_COLLECTION)?;
    tracing::info!(embedded, failed, "knowledge collection rebuilt");
    Ok(ReembedResult { embedded, failed })
}

/// Rebuild the checkpoints collection from the theses in the checkpoint files.
///
/// Same batching and failure handling as [`reembed_items`].
pub fn reembed_checkpoints(
    storage: &Storage,
    embedder: &dyn EmbeddingProvider,
    batch_size: usize,
    mut progress: impl FnMut(usize),
) -> Result<ReembedResult> {
    let checkpoints = load_all_checkpoints(storage);
    let mut vectors = VectorStore::default();
    let mut embedded = 0;
    let mut failed = 0;

    for chunk in checkpoints.chunks(batch_size.max(1)) {
        let theses: Vec<&str> = chunk.iter().map(|cp| cp.thesis.as_str()).collect();
        match embedder.embed_batch(&theses) {
            Ok(batch) => {
                for (cp, vector) in chunk.iter().zip(batch) {
                    match vectors.add(&cp.id, &vector) {
                        Ok(next) => {
                            vectors = next;
                            embedded += 1;
                        }
                        Err(e) => {
                            tracing::warn!(id = %cp.id, error = %e, "vector rejected");
                            failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(batch = chunk.len(), error = %e, "embedding batch failed");
                failed += chunk.len();
            }
        }
        progress(chunk.len());
    }

    vectors.save(&storage.embeddings_dir(), CHECKPOINT_COLLECTION)?;
    tracing::info!(embedded, failed, "checkpoint collection rebuilt");
    Ok(ReembedResult { embedded, failed })
}

// ── Integrity check ──────────────────────────────────────────────────────────

/// Compare the index against content files, vectors and links. Read-only.
pub fn check_integrity(storage: &Storage) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    match storage.index().verify() {
        Ok(skipped) => report.skipped_entries = skipped,
        Err(e) => report.index_error = Some(format!("{e:#}")),
    }
    for collection in [KNOWLEDGE_COLLECTION, CHECKPOINT_COLLECTION] {
        if VectorStore::try_load(&storage.embeddings_dir(), collection).is_err() {
            report.unreadable_collections.push(collection.to_string());
        }
    }

    let items = storage.index().load_fresh();
    let ids: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();
    let indexed_paths: HashSet<&str> = items.iter().map(|item| item.storage_path.as_str()).collect();
    let vectors = VectorStore::load(&storage.embeddings_dir(), KNOWLEDGE_COLLECTION);
    report.items = items.len();

    for item in items.iter() {
        if read_content(storage, item).is_err() {
            report.missing_content.push(item.id.clone());
        }
        if !vectors.contains(&item.id) {
            report.unembedded.push(item.id.clone());
        }
        for edge in &item.links {
            if !ids.contains(edge.target.as_str()) {
                report.dangling_links.push(DanglingLink {
                    source: item.id.clone(),
                    target: edge.target.clone(),
                });
            }
        }
    }

    report.orphan_vectors = vectors
        .ids()
        .iter()
        .filter(|id| !ids.contains(id.as_str()))
        .cloned()
        .collect();

    report.orphan_files = content_files(storage.root())
        .into_iter()
        .filter(|path| !indexed_paths.contains(path.as_str()))
        .collect();

    report
}

/// Relative paths of every `*.md` under `global/` and `skills/<skill>/`.
fn content_files(root: &Path) -> Vec<String> {
    let mut found = Vec::new();
    collect_md(root, GLOBAL_DIR, &mut found);

    let skills = match std::fs::read_dir(root.join(SKILLS_DIR)) {
        Ok(entries) => entries,
        Err(_) => return found,
    };
    let mut skill_dirs: Vec<String> = skills
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    skill_dirs.sort();
    for skill in skill_dirs {
        collect_md(root, &format!("{SKILLS_DIR}/{skill}"), &mut found);
    }
    found
}

fn collect_md(root: &Path, relative_dir: &str, found: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(root.join(relative_dir)) else {
        return;
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| name.ends_with(".md") && !name.starts_with('.'))
        .collect();
    names.sort();
    found.extend(names.into_iter().map(|name| format!("{relative_dir}/{name}")));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KnowledgeConfig;
    use crate::embedding::hash::HashEmbedder;
    use crate::memory::relations::link;
    use crate::memory::store::{add_item, remove_item, NewItem};
    use crate::memory::types::Relation;
    use crate::storage::open_storage;

    fn test_storage() -> (tempfile::TempDir, Storage) {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = open_storage(tmp.path(), &KnowledgeConfig::default()).unwrap();
        (tmp, storage)
    }

    fn backdate(storage: &Storage, id: &str, created: &str) {
        let mut items: Vec<ItemRecord> = storage.index().load_fresh().as_ref().clone();
        let item = items.iter_mut().find(|i| i.id == id).unwrap();
        item.metadata.created = created.into();
        storage.index().save(&items).unwrap();
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_sweep_disabled_for_non_positive_age() {
        let (_tmp, storage) = test_storage();
        add_item(&storage, NewItem::new("ancient", "x"), None).unwrap();
        backdate(&storage, "ancient", "1990-01-01");

        for age in [0, -5] {
            let result = sweep(&storage, age).unwrap();
            assert_eq!(result.pruned, 0);
            assert_eq!(result.remaining, 1);
        }
    }

    #[test]
    fn test_sweep_boundary_is_strictly_older() {
        let (_tmp, storage) = test_storage();
        add_item(&storage, NewItem::new("edge", "x"), None).unwrap();
        add_item(&storage, NewItem::new("past", "y"), None).unwrap();
        backdate(&storage, "edge", "2026-01-01");
        backdate(&storage, "past", "2025-12-31");

        let result = sweep_as_of(&storage, 30, day("2026-01-31")).unwrap();
        assert_eq!(result.pruned_ids, vec!["past"]);
        assert_eq!(result.remaining, 1);
        assert!(storage.root().join("global/edge.md").exists());
        assert!(!storage.root().join("global/past.md").exists());
    }

    #[test]
    fn test_sweep_keeps_unparseable_dates() {
        let (_tmp, storage) = test_storage();
        add_item(&storage, NewItem::new("weird", "x"), None).unwrap();
        backdate(&storage, "weird", "sometime last year");

        let result = sweep_as_of(&storage, 1, day("2030-01-01")).unwrap();
        assert_eq!(result.pruned, 0);
        assert!(storage.index().get("weird").is_some());
    }

    #[test]
    fn test_sweep_removes_vectors() {
        let (_tmp, storage) = test_storage();
        let embedder = HashEmbedder::default();
        add_item(&storage, NewItem::new("old", "x"), Some(&embedder)).unwrap();
        add_item(&storage, NewItem::new("fresh", "y"), Some(&embedder)).unwrap();
        backdate(&storage, "old", "2020-01-01");

        sweep_as_of(&storage, 10, day("2026-01-01")).unwrap();
        let vectors = VectorStore::load(&storage.embeddings_dir(), KNOWLEDGE_COLLECTION);
        assert_eq!(vectors.ids(), ["fresh"]);
    }

    #[test]
    fn test_maintenance_on_save() {
        let tmp = tempfile::TempDir::new().unwrap();
        let policy = KnowledgeConfig {
            max_age_days: 30,
            maintenance_on_save: true,
            ..Default::default()
        };
        let storage = open_storage(tmp.path(), &policy).unwrap();
        add_item(&storage, NewItem::new("old", "x"), None).unwrap();
        backdate(&storage, "old", "2000-01-01");

        let result = add_item(&storage, NewItem::new("new", "y"), None).unwrap();
        let swept = result.swept.unwrap();
        assert_eq!(swept.pruned_ids, vec!["old"]);
        assert_eq!(swept.remaining, 1);
    }

    #[test]
    fn test_reembed_rebuilds_collection() {
        let (_tmp, storage) = test_storage();
        add_item(&storage, NewItem::new("a", "alpha"), None).unwrap();
        add_item(&storage, NewItem::new("b", "beta"), None).unwrap();
        add_item(&storage, NewItem::new("c", "gamma"), None).unwrap();

        let mut seen = 0;
        let result = reembed_items(&storage, &HashEmbedder::default(), 2, |n| seen += n).unwrap();
        assert_eq!(result.embedded, 3);
        assert_eq!(result.failed, 0);
        assert_eq!(seen, 3);

        let vectors = VectorStore::load(&storage.embeddings_dir(), KNOWLEDGE_COLLECTION);
        assert_eq!(vectors.ids(), ["a", "b", "c"]);
    }

    #[test]
    fn test_check_integrity() {
        let (_tmp, storage) = test_storage();
        let embedder = HashEmbedder::default();
        add_item(&storage, NewItem::new("a", "alpha"), Some(&embedder)).unwrap();
        add_item(&storage, NewItem::new("b", "beta"), None).unwrap();
        add_item(&storage, NewItem::new("c", "gamma"), None).unwrap();
        link(&storage, "a", "c", Relation::Related, "", false).unwrap();
        remove_item(&storage, "c").unwrap();
        std::fs::remove_file(storage.root().join("global/b.md")).unwrap();
        std::fs::write(storage.root().join("global/stray.md"), "lost").unwrap();

        let report = check_integrity(&storage);
        assert_eq!(report.items, 2);
        assert_eq!(report.missing_content, vec!["b"]);
        assert_eq!(report.orphan_files, vec!["global/stray.md"]);
        assert_eq!(report.unembedded, vec!["b"]);
        assert_eq!(
            report.dangling_links,
            vec![DanglingLink {
                source: "a".into(),
                target: "c".into()
            }]
        );
        assert!(!report.is_healthy());
    }

    #[test]
    fn test_sweep_refuses_unreadable_index() {
        let (_tmp, storage) = test_storage();
        add_item(&storage, NewItem::new("old", "x"), None).unwrap();
        backdate(&storage, "old", "2000-01-01");
        let path = storage.index().path().to_path_buf();
        let mut raw = std::fs::read(&path).unwrap();
        raw.push(b'}');
        std::fs::write(&path, &raw).unwrap();
        storage.index().invalidate();

        assert!(sweep_as_of(&storage, 30, day("2026-01-01")).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), raw);
        assert!(storage.root().join("global/old.md").exists());

        let report = check_integrity(&storage);
        assert!(report.index_error.is_some());
        assert!(!report.is_healthy());
    }

    #[test]
    fn test_reembed_checkpoints_rebuilds_collection() {
        use crate::memory::checkpoints::{save_checkpoint, NewCheckpoint};

        let (_tmp, storage) = test_storage();
        let embedder = HashEmbedder::default();
        let thesis = "Sparse retrieval still wins on exact identifiers.";
        let first = save_checkpoint(
            &storage,
            NewCheckpoint {
                question: "retrieval".into(),
                thesis: thesis.into(),
                confidence: 0.5,
                ..Default::default()
            },
            Some(&embedder),
            0.85,
            false,
        )
        .unwrap();
        std::fs::write(storage.embeddings_dir().join("checkpoints.vec"), b"junk").unwrap();

        let report = check_integrity(&storage);
        assert_eq!(report.unreadable_collections, vec!["checkpoints"]);

        let result = reembed_checkpoints(&storage, &embedder, 4, |_| {}).unwrap();
        assert_eq!(result.embedded, 1);
        let vectors = VectorStore::try_load(&storage.embeddings_dir(), CHECKPOINT_COLLECTION).unwrap();
        assert_eq!(vectors.ids(), [first.id.unwrap()]);
    }
}
