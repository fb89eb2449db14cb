//! CLI `re-embed` command: rebuild the knowledge and checkpoint vectors with
//! the current embedder.

use std::path::Path;

use anyhow::{Context, Result};
use cairn::config::CairnConfig;
use cairn::memory::checkpoints::load_all_checkpoints;
use cairn::memory::maintenance::{reembed_checkpoints, reembed_items};
use indicatif::ProgressBar;

const BATCH_SIZE: usize = 32;

pub async fn re_embed(config: &CairnConfig, root: Option<&Path>) -> Result<()> {
    let storage = super::open_storage(config, root)?;
    let Some(provider) = super::embedder(config)? else {
        println!("Embedding is disabled (provider = \"none\"); nothing to do.");
        return Ok(());
    };

    let items = storage.index().load_fresh().len();
    let checkpoints = load_all_checkpoints(&storage).len();
    let total = items + checkpoints;
    if total == 0 {
        println!("Nothing to re-embed.");
        return Ok(());
    }

    println!(
        "Re-embedding {items} items and {checkpoints} checkpoints with provider '{}'...",
        config.embedding.provider
    );

    let pb = ProgressBar::new(total as u64);
    pb.set_style(super::progress_style("  {bar:40.cyan/blue} {pos}/{len} ({eta})"));

    let bar = pb.clone();
    let (items_result, checkpoints_result) = tokio::task::spawn_blocking(move || {
        let items = reembed_items(&storage, provider.as_ref(), BATCH_SIZE, |n| bar.inc(n as u64))?;
        let checkpoints =
            reembed_checkpoints(&storage, provider.as_ref(), BATCH_SIZE, |n| bar.inc(n as u64))?;
        anyhow::Ok((items, checkpoints))
    })
    .await?
    .context("re-embedding failed")?;

    pb.finish_and_clear();

    println!(
        "Re-embedded {} item(s) and {} checkpoint(s).",
        items_result.embedded, checkpoints_result.embedded
    );
    let failed = items_result.failed + checkpoints_result.failed;
    if failed > 0 {
        println!("  {failed} vector(s) could not be built; see the log.");
    }
    Ok(())
}
