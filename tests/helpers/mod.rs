#![allow(dead_code)]

use cairn::config::KnowledgeConfig;
use cairn::embedding::hash::HashEmbedder;
use cairn::memory::store::{add_item, NewItem};
use cairn::memory::types::ItemRecord;
use cairn::storage::{open_storage, Storage};
use tempfile::TempDir;

/// Open a fresh storage root in a temp dir. Keep the `TempDir` alive for the
/// duration of the test.
pub fn test_storage() -> (TempDir, Storage) {
    test_storage_with(KnowledgeConfig::default())
}

pub fn test_storage_with(policy: KnowledgeConfig) -> (TempDir, Storage) {
    let tmp = TempDir::new().unwrap();
    let storage = open_storage(tmp.path(), &policy).unwrap();
    (tmp, storage)
}

/// The deterministic embedder used by every test that needs vectors.
pub fn test_embedder() -> HashEmbedder {
    HashEmbedder::default()
}

/// An item with keywords, stored without embedding. Returns the stored id.
pub fn add_keyword_item(storage: &Storage, id: &str, body: &str, keywords: &[&str]) -> String {
    let item = NewItem {
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        ..NewItem::new(id, body)
    };
    add_item(storage, item, None).unwrap().id
}

/// Rewrite an item's creation date directly in the index.
pub fn backdate(storage: &Storage, id: &str, created: &str) {
    let mut items: Vec<ItemRecord> = storage.index().load_fresh().as_ref().clone();
    let item = items.iter_mut().find(|item| item.id == id).unwrap();
    item.metadata.created = created.to_string();
    storage.index().save(&items).unwrap();
}

/// Date `days` days before today, as stored in the index.
pub fn days_ago(days: i64) -> String {
    (chrono::Utc::now().date_naive() - chrono::Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}
