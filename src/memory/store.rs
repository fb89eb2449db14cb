//! Write path for knowledge items: add (upsert), update, status changes, removal.
//!
//! [`add_item`] is the main entry point. It sanitizes the id and skill names,
//! validates trigger patterns, writes the content file, upserts the index
//! record, embeds the item into the `knowledge` collection, and optionally
//! runs the age sweep.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_yaml::Value;

use crate::embedding::EmbeddingProvider;
use crate::memory::maintenance::{sweep, SweepResult};
use crate::memory::patterns::validate_pattern;
use crate::memory::relations;
use crate::memory::types::{
    estimate_tokens, ItemMetadata, ItemRecord, ItemScope, ItemType, Relation, Status, Triggers,
};
use crate::memory::vectors::{update_collection, VectorStore};
use crate::storage::content::{self, Frontmatter};
use crate::storage::guard::sanitize;
use crate::storage::{Storage, GLOBAL_DIR, KNOWLEDGE_COLLECTION, SKILLS_DIR};

/// Input to [`add_item`].
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub id: String,
    pub body: String,
    pub keywords: Vec<String>,
    pub patterns: Vec<String>,
    /// Skill names; empty means global.
    pub skills: Vec<String>,
    pub always_inject: bool,
    pub source: String,
    pub item_type: ItemType,
    pub status: Status,
}

impl NewItem {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            ..Default::default()
        }
    }
}

/// A trigger pattern that failed validation and was left out of the record.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedPattern {
    pub pattern: String,
    pub reason: String,
}

/// Result returned from [`add_item`].
#[derive(Debug, Serialize)]
pub struct AddItemResult {
    /// Sanitized id the item was stored under.
    pub id: String,
    pub storage_path: String,
    /// `false` when an existing item was replaced.
    pub created: bool,
    pub rejected_patterns: Vec<RejectedPattern>,
    /// Whether the item's vector was written.
    pub embedded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swept: Option<SweepResult>,
}

/// Field-level changes for [`update_item`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    pub body: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub patterns: Option<Vec<String>>,
    pub skills: Option<Vec<String>>,
    pub always_inject: Option<bool>,
    pub source: Option<String>,
    pub status: Option<Status>,
    pub item_type: Option<ItemType>,
}

/// Selection for [`list_items`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub item_type: Option<ItemType>,
    pub status: Option<Status>,
    pub skill: Option<String>,
}

/// Add an item, or replace the item with the same (sanitized) id.
///
/// A replaced item keeps its creation date and outgoing links. Rejected
/// patterns are dropped and reported; the rest of the item is still saved.
/// Embedding failures are logged and leave `embedded` false.
pub fn add_item(
    storage: &Storage,
    item: NewItem,
    embedder: Option<&dyn EmbeddingProvider>,
) -> Result<AddItemResult> {
    let id = sanitize(&item.id);
    if id != item.id {
        tracing::warn!(raw = %item.id, id = %id, "item id sanitized");
    }

    let mut skills: Vec<String> = Vec::new();
    for skill in &item.skills {
        let skill = sanitize(skill);
        if !skills.contains(&skill) {
            skills.push(skill);
        }
    }

    let mut patterns = Vec::new();
    let mut rejected_patterns = Vec::new();
    for pattern in item.patterns {
        match validate_pattern(&pattern) {
            Ok(()) if !patterns.contains(&pattern) => patterns.push(pattern),
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(id = %id, pattern = %pattern, reason = %e, "trigger pattern rejected");
                rejected_patterns.push(RejectedPattern {
                    pattern,
                    reason: e.to_string(),
                });
            }
        }
    }

    let mut items: Vec<ItemRecord> = storage.index().load_for_update()?;
    let existing = items.iter().position(|existing| existing.id == id);

    let storage_path = match skills.first() {
        None => format!("{GLOBAL_DIR}/{id}.md"),
        Some(skill) => format!("{SKILLS_DIR}/{skill}/{id}.md"),
    };

    let (created, links) = match existing {
        Some(pos) => (items[pos].metadata.created.clone(), items[pos].links.clone()),
        None => (today(), Vec::new()),
    };

    let record = ItemRecord {
        id: id.clone(),
        storage_path: storage_path.clone(),
        triggers: Triggers {
            patterns,
            ..Triggers::with_keywords(&item.keywords)
        },
        scope: ItemScope {
            skills,
            always_inject: item.always_inject,
        },
        metadata: ItemMetadata {
            created,
            source: item.source,
            tokens: estimate_tokens(&item.body),
            status: item.status,
            item_type: item.item_type,
        },
        links,
    };

    content::write_content(
        storage.root(),
        Path::new(&storage_path),
        &content_header(&record),
        &item.body,
    )
    .with_context(|| format!("failed to write content for {id}"))?;

    let previous_path = match existing {
        Some(pos) => Some(std::mem::replace(&mut items[pos], record.clone()).storage_path),
        None => {
            items.push(record.clone());
            None
        }
    };
    storage.index().save(&items)?;

    // Moved between scopes: the old body is now unreferenced.
    if let Some(old) = previous_path.filter(|old| *old != storage_path) {
        remove_content_file(storage, &old);
    }

    let embedded = match embedder {
        Some(embedder) => embed_item(storage, embedder, &record, &item.body),
        None => false,
    };

    tracing::info!(
        id = %id,
        created = existing.is_none(),
        rejected = rejected_patterns.len(),
        embedded,
        "item stored"
    );

    let policy = storage.policy();
    let swept = if policy.maintenance_on_save && policy.max_age_days > 0 {
        Some(sweep(storage, policy.max_age_days)?)
    } else {
        None
    };

    Ok(AddItemResult {
        id,
        storage_path,
        created: existing.is_none(),
        rejected_patterns,
        embedded,
        swept,
    })
}

/// Apply `update` to an existing item by rewriting it through [`add_item`].
///
/// Returns `false` if the item does not exist. Without a new body, the
/// existing one is carried over; if it cannot be read the update fails and
/// nothing is written.
pub fn update_item(
    storage: &Storage,
    id: &str,
    update: ItemUpdate,
    embedder: Option<&dyn EmbeddingProvider>,
) -> Result<bool> {
    let Some(record) = get_item(storage, id) else {
        return Ok(false);
    };

    // An unreadable body is never rewritten; the caller must supply a new one.
    let body = match update.body {
        Some(body) => body,
        None => read_content(storage, &record).with_context(|| {
            format!("cannot update {}: existing body is unreadable", record.id)
        })?,
    };

    let item = NewItem {
        id: record.id.clone(),
        body,
        keywords: update.keywords.unwrap_or(record.triggers.keywords),
        patterns: update.patterns.unwrap_or(record.triggers.patterns),
        skills: update.skills.unwrap_or(record.scope.skills),
        always_inject: update.always_inject.unwrap_or(record.scope.always_inject),
        source: update.source.unwrap_or(record.metadata.source),
        item_type: update.item_type.unwrap_or(record.metadata.item_type),
        status: update.status.unwrap_or(record.metadata.status),
    };
    add_item(storage, item, embedder)?;
    Ok(true)
}

/// Mark an item deprecated. If `superseded_by` names an existing item, it is
/// linked as `superseded_by --supersedes--> id` in both directions.
pub fn deprecate_item(storage: &Storage, id: &str, superseded_by: Option<&str>) -> Result<bool> {
    let id = sanitize(id);
    if !set_status(storage, &id, Status::Deprecated)? {
        return Ok(false);
    }

    if let Some(replacement) = superseded_by.map(sanitize) {
        match relations::link(storage, &replacement, &id, Relation::Supersedes, "", true)? {
            Some(_) => {}
            None => {
                tracing::warn!(id = %id, replacement = %replacement, "replacement not linked");
            }
        }
    }
    Ok(true)
}

/// Mark an item archived. Archived items stay on disk but are never recalled.
pub fn archive_item(storage: &Storage, id: &str) -> Result<bool> {
    set_status(storage, &sanitize(id), Status::Archived)
}

fn set_status(storage: &Storage, id: &str, status: Status) -> Result<bool> {
    let mut items: Vec<ItemRecord> = storage.index().load_for_update()?;
    let Some(item) = items.iter_mut().find(|item| item.id == id) else {
        return Ok(false);
    };
    if item.metadata.status == status {
        return Ok(true);
    }
    item.metadata.status = status;
    storage.index().save(&items)?;
    tracing::info!(id, status = %status, "item status changed");
    Ok(true)
}

/// Delete an item: content file, then index entry, then vector.
///
/// A content file that cannot be deleted (other than already being gone)
/// aborts the removal with the index untouched. The vector removal is
/// best-effort. Links pointing at the item from elsewhere are left dangling.
pub fn remove_item(storage: &Storage, id: &str) -> Result<bool> {
    let id = sanitize(id);
    let mut items: Vec<ItemRecord> = storage.index().load_for_update()?;
    let Some(pos) = items.iter().position(|item| item.id == id) else {
        return Ok(false);
    };

    let path = crate::storage::guard::resolve_within(storage.root(), &items[pos].storage_path)?;
    match std::fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("failed to delete {}", path.display()));
        }
    }

    items.remove(pos);
    storage.index().save(&items)?;
    remove_vectors(storage, &[id.as_str()]);

    tracing::info!(id = %id, "item removed");
    Ok(true)
}

/// Look up an item by id.
pub fn get_item(storage: &Storage, id: &str) -> Option<ItemRecord> {
    storage.index().get(&sanitize(id))
}

/// Items matching `filter`, in index order.
pub fn list_items(storage: &Storage, filter: &ItemFilter) -> Vec<ItemRecord> {
    storage
        .index()
        .load()
        .iter()
        .filter(|item| filter.item_type.is_none_or(|t| item.metadata.item_type == t))
        .filter(|item| filter.status.is_none_or(|s| item.metadata.status == s))
        .filter(|item| {
            filter
                .skill
                .as_deref()
                .is_none_or(|skill| item.scope.skills.iter().any(|s| s == skill))
        })
        .cloned()
        .collect()
}

/// Read an item's body (header stripped).
pub fn read_content(storage: &Storage, item: &ItemRecord) -> Result<String> {
    let (_, body) = content::read_content_within(storage.root(), Path::new(&item.storage_path))?;
    Ok(body)
}

/// Text an item is embedded from.
pub fn embedding_text(item: &ItemRecord, body: &str) -> String {
    let mut text = item.id.replace(['-', '_'], " ");
    for keyword in &item.triggers.keywords {
        text.push(' ');
        text.push_str(keyword);
    }
    text.push('\n');
    text.push_str(body);
    text
}

fn embed_item(
    storage: &Storage,
    embedder: &dyn EmbeddingProvider,
    record: &ItemRecord,
    body: &str,
) -> bool {
    let vector = match embedder.embed(&embedding_text(record, body)) {
        Ok(vector) => vector,
        Err(e) => {
            tracing::warn!(id = %record.id, error = %e, "embedding failed, item stored without vector");
            return false;
        }
    };
    match update_collection(&storage.embeddings_dir(), KNOWLEDGE_COLLECTION, |store| {
        store.add(&record.id, &vector)
    }) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(id = %record.id, error = %e, "failed to store item vector");
            false
        }
    }
}

/// Drop `ids` from the knowledge collection, logging failures.
pub(crate) fn remove_vectors(storage: &Storage, ids: &[&str]) {
    let result = update_collection(&storage.embeddings_dir(), KNOWLEDGE_COLLECTION, |store| {
        Ok(ids.iter().fold(store.clone(), |acc: VectorStore, id| acc.remove(id)))
    });
    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to remove item vectors");
    }
}

/// Best-effort delete of a content file by its stored relative path.
pub(crate) fn remove_content_file(storage: &Storage, relative: &str) -> bool {
    let path = match crate::storage::guard::resolve_within(storage.root(), relative) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(path = relative, error = %e, "refusing to delete content file");
            return false;
        }
    };
    match std::fs::remove_file(&path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete content file");
            false
        }
    }
}

fn content_header(record: &ItemRecord) -> Frontmatter {
    let mut header = Frontmatter::new();
    header.insert("id".into(), Value::from(record.id.as_str()));
    header.insert("type".into(), Value::from(record.metadata.item_type.as_str()));
    header.insert("created".into(), Value::from(record.metadata.created.as_str()));
    if !record.metadata.source.is_empty() {
        header.insert("source".into(), Value::from(record.metadata.source.as_str()));
    }
    if !record.triggers.keywords.is_empty() {
        let keywords = record
            .triggers
            .keywords
            .iter()
            .map(|k| Value::from(k.as_str()))
            .collect();
        header.insert("keywords".into(), Value::Sequence(keywords));
    }
    header
}

fn today() -> String {
    chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string()
}
