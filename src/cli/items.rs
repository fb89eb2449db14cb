//! CLI item commands: add, show, list, link, unlink, deprecate, archive, remove.

use std::path::Path;

use anyhow::Result;
use cairn::config::CairnConfig;
use cairn::memory::relations;
use cairn::memory::store::{self, ItemFilter, NewItem};
use cairn::memory::types::Relation;

use super::{embedder, open_storage, preview};

pub fn add(config: &CairnConfig, root: Option<&Path>, item: NewItem) -> Result<()> {
    let storage = open_storage(config, root)?;
    let embedder = embedder(config)?;

    let result = store::add_item(&storage, item, embedder.as_deref())?;

    let verb = if result.created { "Added" } else { "Updated" };
    println!("{verb} {} -> {}", result.id, result.storage_path);
    if !result.embedded && embedder.is_some() {
        println!("  warning: item stored without a vector");
    }
    for rejected in &result.rejected_patterns {
        println!("  rejected pattern {:?}: {}", rejected.pattern, rejected.reason);
    }
    if let Some(ref swept) = result.swept {
        if swept.pruned > 0 {
            println!("  pruned {} stale item(s)", swept.pruned);
        }
    }
    Ok(())
}

/// Show a single item with its body and the items it links to.
pub fn show(config: &CairnConfig, root: Option<&Path>, id: &str, depth: usize) -> Result<()> {
    let storage = open_storage(config, root)?;

    let Some(item) = store::get_item(&storage, id) else {
        println!("No item with id {id}.");
        return Ok(());
    };

    println!("Item: {}", item.id);
    println!("{}", "=".repeat(50));
    println!("  Type:           {}", item.metadata.item_type);
    println!("  Status:         {}", item.metadata.status);
    println!("  Created:        {}", item.metadata.created);
    println!("  Path:           {}", item.storage_path);
    println!("  Tokens:         ~{}", item.metadata.tokens);
    if !item.metadata.source.is_empty() {
        println!("  Source:         {}", item.metadata.source);
    }
    if !item.triggers.keywords.is_empty() {
        println!("  Keywords:       {}", item.triggers.keywords.join(", "));
    }
    if !item.triggers.patterns.is_empty() {
        println!("  Patterns:       {}", item.triggers.patterns.join("  "));
    }
    if item.scope.is_global() {
        println!("  Scope:          global");
    } else {
        println!("  Scope:          {}", item.scope.skills.join(", "));
    }
    if item.scope.always_inject {
        println!("  Always inject:  yes");
    }

    println!();
    println!("Content:");
    match store::read_content(&storage, &item) {
        Ok(body) => println!("  {}", body.trim()),
        Err(e) => println!("  (unreadable: {e:#})"),
    }

    let linked = relations::linked_from(&storage, &item.id, depth);
    if !linked.is_empty() {
        println!();
        println!("Links:");
        for entry in &linked {
            println!(
                "  {}--[{}]--> {} ({})",
                "  ".repeat(entry.depth.saturating_sub(1)),
                entry.relation,
                entry.item.id,
                entry.item.metadata.status,
            );
        }
    }

    let incoming = relations::linked_to(&storage, &item.id);
    if !incoming.is_empty() {
        println!();
        println!("Linked from:");
        for entry in &incoming {
            println!("  {} --[{}]-->", entry.item.id, entry.relation);
        }
    }

    Ok(())
}

pub fn list(config: &CairnConfig, root: Option<&Path>, filter: &ItemFilter) -> Result<()> {
    let storage = open_storage(config, root)?;
    let items = store::list_items(&storage, filter);

    if items.is_empty() {
        println!("No items.");
        return Ok(());
    }

    println!("{:<32} {:<11} {:<11} {:<11} Keywords", "ID", "Type", "Status", "Created");
    println!("{}", "-".repeat(90));
    for item in &items {
        println!(
            "{:<32} {:<11} {:<11} {:<11} {}",
            item.id,
            item.metadata.item_type.as_str(),
            item.metadata.status.as_str(),
            item.metadata.created,
            preview(&item.triggers.keywords.join(", "), 30),
        );
    }
    Ok(())
}

pub fn link(
    config: &CairnConfig,
    root: Option<&Path>,
    source: &str,
    target: &str,
    relation: Relation,
    note: &str,
    bidirectional: bool,
) -> Result<()> {
    let storage = open_storage(config, root)?;
    match relations::link(&storage, source, target, relation, note, bidirectional)? {
        Some(result) => {
            let verb = if result.replaced { "Replaced" } else { "Linked" };
            println!("{verb} {} --[{}]--> {}", result.source, result.relation, result.target);
            if let Some(reverse) = result.reverse {
                println!("       {} --[{}]--> {}", result.target, reverse, result.source);
            }
        }
        None => println!("Not linked: both items must exist and differ."),
    }
    Ok(())
}

pub fn unlink(config: &CairnConfig, root: Option<&Path>, source: &str, target: &str) -> Result<()> {
    let storage = open_storage(config, root)?;
    if relations::unlink(&storage, source, target)? {
        println!("Removed link {source} --> {target}.");
    } else {
        println!("No link from {source} to {target}.");
    }
    Ok(())
}

pub fn deprecate(
    config: &CairnConfig,
    root: Option<&Path>,
    id: &str,
    superseded_by: Option<&str>,
) -> Result<()> {
    let storage = open_storage(config, root)?;
    if store::deprecate_item(&storage, id, superseded_by)? {
        match superseded_by {
            Some(replacement) => println!("Deprecated {id} (superseded by {replacement})."),
            None => println!("Deprecated {id}."),
        }
    } else {
        println!("No item with id {id}.");
    }
    Ok(())
}

pub fn archive(config: &CairnConfig, root: Option<&Path>, id: &str) -> Result<()> {
    let storage = open_storage(config, root)?;
    if store::archive_item(&storage, id)? {
        println!("Archived {id}.");
    } else {
        println!("No item with id {id}.");
    }
    Ok(())
}

pub fn remove(config: &CairnConfig, root: Option<&Path>, id: &str) -> Result<()> {
    let storage = open_storage(config, root)?;
    if store::remove_item(&storage, id)? {
        println!("Removed {id}.");
    } else {
        println!("No item with id {id}.");
    }
    Ok(())
}
