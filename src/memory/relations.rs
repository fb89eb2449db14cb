//! Typed links between items and bounded traversal over them.
//!
//! Edges live on the source item's index record. A link to an item that was
//! later removed stays in place; traversal skips it.

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::Result;
use serde::Serialize;

use crate::error::ValidationError;
use crate::memory::types::{ItemRecord, Link, Relation};
use crate::storage::guard::sanitize;
use crate::storage::Storage;

/// Result returned from [`link`].
#[derive(Debug, Serialize)]
pub struct LinkResult {
    pub source: String,
    pub target: String,
    pub relation: Relation,
    /// `true` if an existing edge to the same target was overwritten.
    pub replaced: bool,
    /// Relation written on the reverse edge, if one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<Relation>,
}

/// An item reached over a link.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedItem {
    pub item: ItemRecord,
    /// Relation of the edge the item was reached by.
    pub relation: Relation,
    /// Hops from the starting item.
    pub depth: usize,
}

/// Link `source` to `target`.
///
/// Both items must exist; `Ok(None)` otherwise, and for self-links. An
/// existing edge from `source` to `target` is replaced, not duplicated. With
/// `bidirectional`, `target` also gets an edge back using
/// [`Relation::inverse`].
pub fn link(
    storage: &Storage,
    source: &str,
    target: &str,
    relation: Relation,
    note: &str,
    bidirectional: bool,
) -> Result<Option<LinkResult>> {
    let source = sanitize(source);
    let target = sanitize(target);
    if source == target {
        let err = ValidationError::SelfLink(source);
        tracing::warn!(error = %err, "link rejected");
        return Ok(None);
    }

    let mut items: Vec<ItemRecord> = storage.index().load_for_update()?;
    let source_pos = items.iter().position(|item| item.id == source);
    let target_pos = items.iter().position(|item| item.id == target);
    let (Some(source_pos), Some(target_pos)) = (source_pos, target_pos) else {
        tracing::debug!(source = %source, target = %target, "link endpoint not found");
        return Ok(None);
    };

    let replaced = upsert_edge(&mut items[source_pos], &target, relation, note);
    let reverse = bidirectional.then(|| {
        let inverse = relation.inverse();
        upsert_edge(&mut items[target_pos], &source, inverse, note);
        inverse
    });

    storage.index().save(&items)?;
    tracing::info!(source = %source, target = %target, relation = %relation, bidirectional, "items linked");

    Ok(Some(LinkResult {
        source,
        target,
        relation,
        replaced,
        reverse,
    }))
}

/// Write `target` into `item.links`, replacing any edge to the same target.
fn upsert_edge(item: &mut ItemRecord, target: &str, relation: Relation, note: &str) -> bool {
    let edge = Link {
        target: target.to_string(),
        relation,
        note: note.to_string(),
    };
    match item.links.iter_mut().find(|l| l.target == target) {
        Some(existing) => {
            *existing = edge;
            true
        }
        None => {
            item.links.push(edge);
            false
        }
    }
}

/// Remove the edge from `source` to `target`. `false` if there was none.
pub fn unlink(storage: &Storage, source: &str, target: &str) -> Result<bool> {
    let source = sanitize(source);
    let target = sanitize(target);

    let mut items: Vec<ItemRecord> = storage.index().load_for_update()?;
    let Some(item) = items.iter_mut().find(|item| item.id == source) else {
        return Ok(false);
    };
    let before = item.links.len();
    item.links.retain(|l| l.target != target);
    if item.links.len() == before {
        return Ok(false);
    }

    storage.index().save(&items)?;
    tracing::info!(source = %source, target = %target, "link removed");
    Ok(true)
}

/// Items reachable from `source` within `max_depth` hops, breadth-first.
///
/// Each item appears once, at its shortest distance; `source` itself never
/// appears. Dangling edges are skipped.
pub fn linked_from(storage: &Storage, source: &str, max_depth: usize) -> Vec<LinkedItem> {
    let source = sanitize(source);
    let snapshot = storage.index().load();
    let by_id: HashMap<&str, &ItemRecord> =
        snapshot.iter().map(|item| (item.id.as_str(), item)).collect();

    let mut results = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();

    let Some(start) = by_id.get(source.as_str()) else {
        return results;
    };
    visited.insert(start.id.as_str());
    queue.push_back((start.id.as_str(), 0));

    while let Some((id, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let Some(node) = by_id.get(id) else { continue };
        for edge in &node.links {
            let Some(next) = by_id.get(edge.target.as_str()) else {
                tracing::debug!(from = id, target = %edge.target, "skipping dangling link");
                continue;
            };
            if !visited.insert(next.id.as_str()) {
                continue;
            }
            results.push(LinkedItem {
                item: (*next).clone(),
                relation: edge.relation,
                depth: depth + 1,
            });
            queue.push_back((next.id.as_str(), depth + 1));
        }
    }

    results
}

/// Items with an outgoing edge to `target`, in index order.
pub fn linked_to(storage: &Storage, target: &str) -> Vec<LinkedItem> {
    let target = sanitize(target);
    storage
        .index()
        .load()
        .iter()
        .filter_map(|item| {
            item.link_to(&target).map(|edge| LinkedItem {
                item: item.clone(),
                relation: edge.relation,
                depth: 1,
            })
        })
        .collect()
}
