use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::memory::checkpoints::list_checkpoints;
use crate::memory::vectors::VectorStore;
use crate::storage::{Storage, CHECKPOINT_COLLECTION, KNOWLEDGE_COLLECTION};

/// Response from memory_stats.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_items: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub always_inject: usize,
    pub scoped: usize,
    pub links: usize,
    pub dangling_links: usize,
    pub checkpoints: usize,
    pub knowledge_vectors: usize,
    pub checkpoint_vectors: usize,
    pub total_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_item: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_item: Option<String>,
}

/// Compute storage statistics. Read-only; unreadable parts count as empty.
pub fn memory_stats(storage: &Storage) -> StatsResponse {
    let items = storage.index().load();
    let ids: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();

    let mut by_type = BTreeMap::new();
    let mut by_status = BTreeMap::new();
    let mut links = 0;
    let mut dangling_links = 0;
    for item in items.iter() {
        *by_type.entry(item.metadata.item_type.to_string()).or_insert(0) += 1;
        *by_status.entry(item.metadata.status.to_string()).or_insert(0) += 1;
        links += item.links.len();
        dangling_links += item
            .links
            .iter()
            .filter(|edge| !ids.contains(edge.target.as_str()))
            .count();
    }

    let dates: Vec<_> = items
        .iter()
        .filter_map(|item| item.metadata.created_date())
        .collect();
    let oldest_item = dates.iter().min().map(|d| d.to_string());
    let newest_item = dates.iter().max().map(|d| d.to_string());

    let embeddings = storage.embeddings_dir();
    StatsResponse {
        total_items: items.len(),
        by_type,
        by_status,
        always_inject: items.iter().filter(|i| i.scope.always_inject).count(),
        scoped: items.iter().filter(|i| !i.scope.is_global()).count(),
        links,
        dangling_links,
        checkpoints: list_checkpoints(storage).len(),
        knowledge_vectors: VectorStore::load(&embeddings, KNOWLEDGE_COLLECTION).len(),
        checkpoint_vectors: VectorStore::load(&embeddings, CHECKPOINT_COLLECTION).len(),
        total_tokens: items.iter().map(|i| i.metadata.tokens).sum(),
        oldest_item,
        newest_item,
    }
}
