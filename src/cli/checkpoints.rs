//! CLI `checkpoint` commands: save, list, show, delete.

use std::path::Path;

use anyhow::Result;
use cairn::config::CairnConfig;
use cairn::memory::checkpoints::{self, NewCheckpoint};

use super::{embedder, open_storage, preview};

pub fn save(
    config: &CairnConfig,
    root: Option<&Path>,
    checkpoint: NewCheckpoint,
    force: bool,
) -> Result<()> {
    let storage = open_storage(config, root)?;
    let embedder = embedder(config)?;

    let result = checkpoints::save_checkpoint(
        &storage,
        checkpoint,
        embedder.as_deref(),
        config.checkpoints.dedup_threshold,
        force,
    )?;

    match (&result.id, &result.duplicate) {
        (Some(id), _) => println!("Saved checkpoint {id}"),
        (None, Some(duplicate)) => {
            println!(
                "Not saved: thesis duplicates {} (similarity {:.3}).",
                duplicate.matched_id.as_deref().unwrap_or("?"),
                duplicate.score
            );
            println!("Use --force to save it anyway.");
        }
        (None, None) => println!("Not saved."),
    }
    Ok(())
}

pub fn list(config: &CairnConfig, root: Option<&Path>) -> Result<()> {
    let storage = open_storage(config, root)?;
    let summaries = checkpoints::list_checkpoints(&storage);

    if summaries.is_empty() {
        println!("No checkpoints.");
        return Ok(());
    }

    println!("{:<48} {:<10} Question", "ID", "Confidence");
    println!("{}", "-".repeat(100));
    for cp in &summaries {
        println!("{:<48} {:<10.2} {}", cp.id, cp.confidence, preview(&cp.question, 60));
    }
    Ok(())
}

pub fn show(config: &CairnConfig, root: Option<&Path>, id: &str) -> Result<()> {
    let storage = open_storage(config, root)?;
    let Some(cp) = checkpoints::load_checkpoint(&storage, id) else {
        println!("No checkpoint with id {id}.");
        return Ok(());
    };

    println!("Checkpoint: {}", cp.id);
    println!("{}", "=".repeat(50));
    println!("  Created:     {}", cp.created_at);
    println!("  Confidence:  {:.2}", cp.confidence);
    if !cp.tags.is_empty() {
        println!("  Tags:        {}", cp.tags.join(", "));
    }
    println!();
    println!("Question:");
    println!("  {}", cp.question);
    println!();
    println!("Thesis:");
    println!("  {}", cp.thesis);

    if !cp.evidence.is_empty() {
        println!();
        println!("Evidence:");
        for line in &cp.evidence {
            println!("  - {line}");
        }
    }
    if !cp.open_questions.is_empty() {
        println!();
        println!("Open questions:");
        for line in &cp.open_questions {
            println!("  - {line}");
        }
    }
    Ok(())
}

pub fn delete(config: &CairnConfig, root: Option<&Path>, id: &str) -> Result<()> {
    let storage = open_storage(config, root)?;
    if checkpoints::delete_checkpoint(&storage, id)? {
        println!("Deleted checkpoint {id}.");
    } else {
        println!("No checkpoint with id {id}.");
    }
    Ok(())
}
