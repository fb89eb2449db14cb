//! Relevance scoring and recall.
//!
//! Two mutually exclusive modes, chosen by whether an embedder is supplied:
//!
//! - **keyword**: additive score from keyword and pattern hits, compared
//!   against the request threshold
//! - **semantic**: `0.7 * similarity + 0.3 * normalized keyword score`, each
//!   term in `[0, 1]`, compared against the item type's threshold
//!
//! Both modes apply the scope filter, skip archived items, sort stably by
//! score and then fill `max_items` greedily under the token budget.

use std::sync::Arc;

use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::config::RecallConfig;
use crate::embedding::EmbeddingProvider;
use crate::memory::index::Snapshot;
use crate::memory::patterns::compile_trigger;
use crate::memory::store::read_content;
use crate::memory::types::{ItemRecord, ItemType, Triggers};
use crate::memory::vectors::VectorStore;
use crate::storage::{Storage, KNOWLEDGE_COLLECTION};

/// Score of an `always_inject` item in keyword mode.
pub const ALWAYS_INJECT_SCORE: f64 = 10.0;
pub const WHOLE_WORD_SCORE: f64 = 3.0;
pub const SUBSTRING_SCORE: f64 = 1.0;
pub const PATTERN_SCORE: f64 = 2.0;

/// Blend weights for semantic mode.
pub const EMBEDDING_WEIGHT: f64 = 0.7;
pub const KEYWORD_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallMode {
    Keyword,
    Semantic,
}

/// Preset keyword thresholds: quick recall is strict, deep recall is loose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecallDepth {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl RecallDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Standard => "standard",
            Self::Deep => "deep",
        }
    }

    pub fn threshold(&self, config: &RecallConfig) -> f64 {
        match self {
            Self::Quick => config.quick_threshold,
            Self::Standard => config.standard_threshold,
            Self::Deep => config.deep_threshold,
        }
    }
}

impl std::fmt::Display for RecallDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecallDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quick" => Ok(Self::Quick),
            "standard" => Ok(Self::Standard),
            "deep" => Ok(Self::Deep),
            _ => Err(format!("unknown recall depth: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecallRequest {
    pub query: String,
    /// Caller's skill; `None` sees only global items.
    pub scope: Option<String>,
    /// Minimum keyword-mode score. Ignored in semantic mode.
    pub threshold: f64,
    pub max_items: usize,
    pub token_budget: usize,
    /// Restrict to these types; `None` allows all.
    pub allowed_types: Option<Vec<ItemType>>,
}

impl RecallRequest {
    pub fn for_depth(query: impl Into<String>, depth: RecallDepth, config: &RecallConfig) -> Self {
        Self {
            query: query.into(),
            scope: None,
            threshold: depth.threshold(config),
            max_items: config.max_items,
            token_budget: config.token_budget,
            allowed_types: None,
        }
    }

    fn allows(&self, item_type: ItemType) -> bool {
        self.allowed_types
            .as_ref()
            .is_none_or(|types| types.contains(&item_type))
    }
}

/// One recalled item with its score and body.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredItem {
    pub item: ItemRecord,
    pub score: f64,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct RecallResponse {
    pub results: Vec<ScoredItem>,
    /// Items that passed the threshold, before the item and token limits.
    pub total_matched: usize,
    /// Sum of the selected items' token estimates.
    pub token_estimate: usize,
    pub mode: RecallMode,
}

/// Keyword-mode score of `item` for `query` as seen from `caller_scope`.
///
/// Out-of-scope items score 0; `always_inject` items score
/// [`ALWAYS_INJECT_SCORE`] whatever the query.
pub fn score(item: &ItemRecord, query: &str, caller_scope: Option<&str>) -> f64 {
    score_compiled(item, &CompiledTriggers::new(&item.triggers), query, caller_scope)
}

fn score_compiled(
    item: &ItemRecord,
    triggers: &CompiledTriggers,
    query: &str,
    caller_scope: Option<&str>,
) -> f64 {
    if !item.scope.admits(caller_scope) {
        return 0.0;
    }
    if item.scope.always_inject {
        return ALWAYS_INJECT_SCORE;
    }
    triggers.score(query)
}

/// Highest [`CompiledTriggers::score`] the item could reach.
pub fn max_trigger_score(item: &ItemRecord) -> f64 {
    item.triggers.keywords.len() as f64 * WHOLE_WORD_SCORE
        + item.triggers.patterns.len() as f64 * PATTERN_SCORE
}

struct KeywordMatcher {
    lowered: String,
    whole_word: Option<Regex>,
}

/// An item's triggers with their regexes built.
pub struct CompiledTriggers {
    keywords: Vec<KeywordMatcher>,
    patterns: Vec<Regex>,
}

impl CompiledTriggers {
    pub fn new(triggers: &Triggers) -> Self {
        let keywords = triggers
            .keywords
            .iter()
            .map(|keyword| KeywordMatcher {
                lowered: keyword.to_lowercase(),
                whole_word: RegexBuilder::new(&format!(r"\b{}\b", regex::escape(keyword)))
                    .case_insensitive(true)
                    .build()
                    .ok(),
            })
            .collect();
        // Stored patterns were validated on save and are not re-checked.
        let patterns = triggers
            .patterns
            .iter()
            .filter_map(|pattern| compile_trigger(pattern))
            .collect();
        Self { keywords, patterns }
    }

    /// Keyword and pattern hits, with no scope or injection handling.
    pub fn score(&self, query: &str) -> f64 {
        let lowered = query.to_lowercase();
        let mut total = 0.0;

        for keyword in &self.keywords {
            if keyword.whole_word.as_ref().is_some_and(|re| re.is_match(query)) {
                total += WHOLE_WORD_SCORE;
            } else if lowered.contains(&keyword.lowered) {
                total += SUBSTRING_SCORE;
            }
        }

        for pattern in &self.patterns {
            if pattern.is_match(query) {
                total += PATTERN_SCORE;
            }
        }

        total
    }
}

/// Compiled triggers for the most recent index snapshot, parallel to it.
///
/// Rebuilt only when recall sees a different snapshot.
#[derive(Default)]
pub struct TriggerCache {
    state: Mutex<Option<(Snapshot, Arc<Vec<CompiledTriggers>>)>>,
}

impl TriggerCache {
    pub fn for_snapshot(&self, snapshot: &Snapshot) -> Arc<Vec<CompiledTriggers>> {
        if let Some((cached, compiled)) = self.state.lock().as_ref() {
            if Arc::ptr_eq(cached, snapshot) {
                return Arc::clone(compiled);
            }
        }

        let compiled: Arc<Vec<CompiledTriggers>> = Arc::new(
            snapshot
                .iter()
                .map(|item| CompiledTriggers::new(&item.triggers))
                .collect(),
        );
        tracing::debug!(items = snapshot.len(), "trigger patterns compiled");
        *self.state.lock() = Some((Arc::clone(snapshot), Arc::clone(&compiled)));
        compiled
    }
}

/// Select the items relevant to `request`.
///
/// With an embedder, runs in semantic mode; if embedding the query fails the
/// call falls back to keyword mode.
pub fn recall(
    storage: &Storage,
    request: &RecallRequest,
    embedder: Option<&dyn EmbeddingProvider>,
) -> RecallResponse {
    let snapshot = storage.index().load();
    let compiled = storage.trigger_cache().for_snapshot(&snapshot);
    let candidates: Vec<(&ItemRecord, &CompiledTriggers)> = snapshot
        .iter()
        .zip(compiled.iter())
        .filter(|(item, _)| item.metadata.status.is_recallable())
        .filter(|(item, _)| request.allows(item.metadata.item_type))
        .filter(|(item, _)| item.scope.admits(request.scope.as_deref()))
        .collect();

    let query_vector = embedder.and_then(|embedder| match embedder.embed(&request.query) {
        Ok(vector) => Some(vector),
        Err(e) => {
            tracing::warn!(error = %e, "query embedding failed, falling back to keyword recall");
            None
        }
    });

    let (mode, mut scored) = match query_vector {
        Some(query_vector) => {
            let vectors = VectorStore::load(&storage.embeddings_dir(), KNOWLEDGE_COLLECTION);
            let scored = candidates
                .into_iter()
                .filter_map(|(item, triggers)| {
                    let combined = semantic_score(item, triggers, &request.query, &query_vector, &vectors);
                    (combined >= item.metadata.item_type.semantic_threshold())
                        .then_some((item, combined))
                })
                .collect::<Vec<_>>();
            (RecallMode::Semantic, scored)
        }
        None => {
            let scored = candidates
                .into_iter()
                .filter_map(|(item, triggers)| {
                    let s = score_compiled(item, triggers, &request.query, request.scope.as_deref());
                    (s >= request.threshold).then_some((item, s))
                })
                .collect::<Vec<_>>();
            (RecallMode::Keyword, scored)
        }
    };

    let total_matched = scored.len();
    // Stable: ties keep index order.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut results = Vec::new();
    let mut token_estimate: usize = 0;
    for (item, item_score) in scored {
        if results.len() >= request.max_items {
            break;
        }
        let tokens = item.metadata.tokens;
        let running = token_estimate.saturating_add(tokens);
        if running > request.token_budget {
            tracing::debug!(id = %item.id, tokens, "skipping item over token budget");
            continue;
        }
        token_estimate = running;

        let content = read_content(storage, item).unwrap_or_else(|e| {
            tracing::warn!(id = %item.id, error = %e, "recalled item body unreadable");
            String::new()
        });
        results.push(ScoredItem {
            item: item.clone(),
            score: item_score,
            content,
        });
    }

    tracing::debug!(
        mode = ?mode,
        matched = total_matched,
        returned = results.len(),
        token_estimate,
        "recall finished"
    );

    RecallResponse {
        results,
        total_matched,
        token_estimate,
        mode,
    }
}

/// Blended `[0, 1]` score. Items without a stored vector get no similarity
/// credit; items without triggers get no keyword credit.
fn semantic_score(
    item: &ItemRecord,
    triggers: &CompiledTriggers,
    query: &str,
    query_vector: &[f32],
    vectors: &VectorStore,
) -> f64 {
    if item.scope.always_inject {
        return 1.0;
    }
    let similarity = vectors
        .score_of(&item.id, query_vector)
        .map_or(0.0, |s| f64::from(s).clamp(0.0, 1.0));
    let max = max_trigger_score(item);
    let keyword = if max > 0.0 {
        (triggers.score(query) / max).clamp(0.0, 1.0)
    } else {
        0.0
    };
    EMBEDDING_WEIGHT * similarity + KEYWORD_WEIGHT * keyword
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KnowledgeConfig;
    use crate::embedding::hash::HashEmbedder;
    use crate::memory::store::{add_item, archive_item, deprecate_item, NewItem};
    use crate::memory::types::{ItemMetadata, ItemScope, Triggers};
    use crate::storage::open_storage;

    fn record(keywords: &[&str], patterns: &[&str]) -> ItemRecord {
        ItemRecord {
            id: "x".into(),
            storage_path: "global/x.md".into(),
            triggers: Triggers {
                keywords: keywords.iter().map(|s| s.to_string()).collect(),
                patterns: patterns.iter().map(|s| s.to_string()).collect(),
            },
            scope: ItemScope::default(),
            metadata: ItemMetadata {
                created: "2026-01-01".into(),
                source: String::new(),
                tokens: 10,
                status: Default::default(),
                item_type: Default::default(),
            },
            links: Vec::new(),
        }
    }

    fn request(query: &str, threshold: f64) -> RecallRequest {
        RecallRequest {
            query: query.into(),
            scope: None,
            threshold,
            max_items: 5,
            token_budget: 2000,
            allowed_types: None,
        }
    }

    fn test_storage() -> (tempfile::TempDir, Storage) {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = open_storage(tmp.path(), &KnowledgeConfig::default()).unwrap();
        (tmp, storage)
    }

    fn keyword_item(id: &str, keywords: &[&str], body: &str) -> NewItem {
        NewItem {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            ..NewItem::new(id, body)
        }
    }

    #[test]
    fn test_whole_word_beats_substring() {
        let item = record(&["gdpr"], &[]);
        assert_eq!(score(&item, "What are the GDPR requirements?", None), 3.0);
        assert_eq!(score(&item, "gdprish rules", None), 1.0);
        assert_eq!(score(&item, "nothing relevant", None), 0.0);
    }

    #[test]
    fn test_patterns_add_two() {
        let item = record(&["key"], &[r"api[_-]?key"]);
        // "key" is a whole word in neither query; substring only.
        assert_eq!(score(&item, "where is the API_KEY", None), 1.0 + 2.0);
        assert_eq!(score(&item, "rotate the api key", None), 3.0);
    }

    #[test]
    fn test_scope_filter() {
        let mut item = record(&["gdpr"], &[]);
        item.scope.skills = vec!["legal".into()];
        assert_eq!(score(&item, "gdpr", Some("research")), 0.0);
        assert_eq!(score(&item, "gdpr", None), 0.0);
        assert_eq!(score(&item, "gdpr", Some("legal")), 3.0);
    }

    #[test]
    fn test_always_inject_short_circuits() {
        let mut item = record(&[], &[]);
        item.scope.always_inject = true;
        assert_eq!(score(&item, "anything at all", None), ALWAYS_INJECT_SCORE);

        item.scope.skills = vec!["legal".into()];
        assert_eq!(score(&item, "anything at all", Some("other")), 0.0);
    }

    #[test]
    fn test_recall_gdpr_scenario() {
        let (_tmp, storage) = test_storage();
        add_item(
            &storage,
            keyword_item("gdpr-consent", &["gdpr", "consent"], "Record consent."),
            None,
        )
        .unwrap();
        add_item(&storage, keyword_item("billing", &["invoice"], "Monthly."), None).unwrap();

        let response = recall(&storage, &request("What are the GDPR requirements?", 2.0), None);
        assert_eq!(response.mode, RecallMode::Keyword);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].item.id, "gdpr-consent");
        assert!(response.results[0].score >= 3.0);
        assert_eq!(response.results[0].content, "Record consent.");
    }

    #[test]
    fn test_recall_orders_by_score_then_index() {
        let (_tmp, storage) = test_storage();
        add_item(&storage, keyword_item("one", &["deploy"], "a"), None).unwrap();
        add_item(&storage, keyword_item("two", &["deploy", "rollback"], "b"), None).unwrap();
        add_item(&storage, keyword_item("three", &["deploy"], "c"), None).unwrap();

        let response = recall(&storage, &request("deploy then rollback", 1.0), None);
        let ids: Vec<_> = response.results.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec!["two", "one", "three"]);
        assert_eq!(response.total_matched, 3);
    }

    #[test]
    fn test_recall_skips_items_over_budget() {
        let (_tmp, storage) = test_storage();
        add_item(&storage, keyword_item("big", &["deploy", "prod"], &"x".repeat(400)), None).unwrap();
        add_item(&storage, keyword_item("small", &["deploy"], &"y".repeat(40)), None).unwrap();

        let mut req = request("deploy to prod", 1.0);
        req.token_budget = 50;
        let response = recall(&storage, &req, None);

        let ids: Vec<_> = response.results.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec!["small"]);
        assert_eq!(response.token_estimate, 10);
        assert_eq!(response.total_matched, 2);
    }

    #[test]
    fn test_huge_token_count_is_skipped_not_overflowed() {
        let (_tmp, storage) = test_storage();
        add_item(&storage, keyword_item("small", &["deploy", "prod"], "tiny"), None).unwrap();
        add_item(&storage, keyword_item("huge", &["deploy"], "edited"), None).unwrap();

        let mut items: Vec<ItemRecord> = storage.index().load_fresh().as_ref().clone();
        items[1].metadata.tokens = usize::MAX;
        storage.index().save(&items).unwrap();

        let response = recall(&storage, &request("deploy to prod", 1.0), None);
        let ids: Vec<_> = response.results.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec!["small"]);
        assert_eq!(response.total_matched, 2);
    }

    #[test]
    fn test_triggers_compiled_once_per_snapshot() {
        let (_tmp, storage) = test_storage();
        add_item(&storage, keyword_item("a", &["deploy"], "a"), None).unwrap();

        let snapshot = storage.index().load();
        let first = storage.trigger_cache().for_snapshot(&snapshot);
        let again = storage.trigger_cache().for_snapshot(&storage.index().load());
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first[0].score("deploy now"), WHOLE_WORD_SCORE);

        add_item(&storage, keyword_item("b", &["rollback"], "b"), None).unwrap();
        let rebuilt = storage.trigger_cache().for_snapshot(&storage.index().load());
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.len(), 2);
    }

    #[test]
    fn test_recall_respects_max_items() {
        let (_tmp, storage) = test_storage();
        for id in ["a", "b", "c"] {
            add_item(&storage, keyword_item(id, &["deploy"], id), None).unwrap();
        }
        let mut req = request("deploy", 1.0);
        req.max_items = 2;
        assert_eq!(recall(&storage, &req, None).results.len(), 2);
    }

    #[test]
    fn test_recall_excludes_archived_keeps_deprecated() {
        let (_tmp, storage) = test_storage();
        add_item(&storage, keyword_item("old", &["deploy"], "a"), None).unwrap();
        add_item(&storage, keyword_item("gone", &["deploy"], "b"), None).unwrap();
        deprecate_item(&storage, "old", None).unwrap();
        archive_item(&storage, "gone").unwrap();

        let response = recall(&storage, &request("deploy", 1.0), None);
        let ids: Vec<_> = response.results.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec!["old"]);
    }

    #[test]
    fn test_recall_allowed_types() {
        let (_tmp, storage) = test_storage();
        add_item(&storage, keyword_item("fact", &["deploy"], "a"), None).unwrap();
        add_item(
            &storage,
            NewItem {
                item_type: ItemType::Todo,
                ..keyword_item("task", &["deploy"], "b")
            },
            None,
        )
        .unwrap();

        let mut req = request("deploy", 1.0);
        req.allowed_types = Some(vec![ItemType::Todo]);
        let response = recall(&storage, &req, None);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].item.id, "task");
    }

    #[test]
    fn test_semantic_recall() {
        let (_tmp, storage) = test_storage();
        let embedder = HashEmbedder::default();
        add_item(
            &storage,
            keyword_item(
                "gdpr-consent",
                &["gdpr", "consent"],
                "Record consent before processing personal data.",
            ),
            Some(&embedder),
        )
        .unwrap();
        add_item(
            &storage,
            keyword_item("billing", &["invoice"], "Send invoices on the first of the month."),
            Some(&embedder),
        )
        .unwrap();

        let response = recall(&storage, &request("gdpr consent", 100.0), Some(&embedder));
        assert_eq!(response.mode, RecallMode::Semantic);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].item.id, "gdpr-consent");
        assert!(response.results[0].score >= 0.70 && response.results[0].score <= 1.0);
    }

    #[test]
    fn test_for_depth_uses_config() {
        let config = RecallConfig::default();
        let quick = RecallRequest::for_depth("q", RecallDepth::Quick, &config);
        let deep = RecallRequest::for_depth("q", RecallDepth::Deep, &config);
        assert!(quick.threshold > deep.threshold);
        assert_eq!(quick.max_items, config.max_items);
        assert_eq!("deep".parse::<RecallDepth>().unwrap(), RecallDepth::Deep);
    }
}
