//! CLI `doctor` command: check a storage root and print a health report.

use std::path::Path;

use anyhow::Result;
use cairn::config::CairnConfig;
use cairn::memory::maintenance::check_integrity;
use cairn::storage::INDEX_FILE;

pub fn doctor(config: &CairnConfig, root: Option<&Path>) -> Result<()> {
    let storage = super::open_storage(config, root)?;
    let index_path = storage.root().join(INDEX_FILE);
    let file_size = std::fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);

    let report = check_integrity(&storage);

    println!("Cairn Health Report");
    println!("===================");
    println!();
    println!("Root:              {}", storage.root().display());
    println!("Index:             {} ({})", index_path.display(), format_bytes(file_size));
    println!("Embedding:         {} ({})", config.embedding.provider, config.embedding.model);
    println!();
    if let Some(error) = &report.index_error {
        println!("Index error:       {error}");
    }
    println!("Skipped entries:   {}", report.skipped_entries);
    println!("Items:             {}", report.items);
    println!("Missing content:   {}", report.missing_content.len());
    println!("Orphan files:      {}", report.orphan_files.len());
    println!("Unembedded items:  {}", report.unembedded.len());
    println!("Orphan vectors:    {}", report.orphan_vectors.len());
    println!("Dangling links:    {}", report.dangling_links.len());

    for id in &report.missing_content {
        println!("  missing content: {id}");
    }
    for path in &report.orphan_files {
        println!("  orphan file:     {path}");
    }
    for edge in &report.dangling_links {
        println!("  dangling link:   {} --> {}", edge.source, edge.target);
    }
    for collection in &report.unreadable_collections {
        println!("  unreadable vectors: {collection}");
    }

    println!();
    if report.is_healthy() {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED");
        println!();
        println!("Recovery steps:");
        if report.index_error.is_some() {
            println!("  - Repair {} or move it aside; writes are refused until then", INDEX_FILE);
        }
        if report.skipped_entries > 0 {
            println!("  - Fix the malformed index entries; the next write keeps a copy of the file");
        }
        println!("  - Re-add items with missing content: cairn add <id> < body.md");
        println!("  - Delete or re-add orphan files under global/ and skills/");
    }
    if !report.unembedded.is_empty()
        || !report.orphan_vectors.is_empty()
        || !report.unreadable_collections.is_empty()
    {
        println!("Run `cairn re-embed` to rebuild the knowledge vectors.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
