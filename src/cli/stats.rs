use std::path::Path;

use anyhow::Result;
use cairn::config::CairnConfig;
use cairn::memory::types::{ItemType, Status};

use super::open_storage;

/// Display storage statistics in the terminal.
pub fn stats(config: &CairnConfig, root: Option<&Path>, json: bool) -> Result<()> {
    let storage = open_storage(config, root)?;
    let response = cairn::memory::stats::memory_stats(&storage);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("Memory Statistics ({})", storage.root().display());
    println!("{}", "=".repeat(40));
    println!("  Total items:         {}", response.total_items);
    println!("  Always inject:       {}", response.always_inject);
    println!("  Skill-scoped:        {}", response.scoped);
    println!("  Estimated tokens:    {}", response.total_tokens);
    println!();

    println!("By Type:");
    for t in ItemType::ALL {
        let count = response.by_type.get(t.as_str()).copied().unwrap_or(0);
        println!("  {:<12} {}", t.as_str(), count);
    }
    println!();

    println!("By Status:");
    for s in Status::ALL {
        let count = response.by_status.get(s.as_str()).copied().unwrap_or(0);
        println!("  {:<12} {}", s.as_str(), count);
    }
    println!();

    println!("Links:                 {}", response.links);
    println!("Dangling links:        {}", response.dangling_links);
    println!("Checkpoints:           {}", response.checkpoints);
    println!("Knowledge vectors:     {}", response.knowledge_vectors);
    println!("Checkpoint vectors:    {}", response.checkpoint_vectors);

    if let Some(ref oldest) = response.oldest_item {
        println!("Oldest item:           {oldest}");
    }
    if let Some(ref newest) = response.newest_item {
        println!("Newest item:           {newest}");
    }

    Ok(())
}
