//! CLI `sweep` command: prune items past the configured maximum age.

use std::path::Path;

use anyhow::Result;
use cairn::config::CairnConfig;
use cairn::memory::maintenance;

pub fn sweep(config: &CairnConfig, root: Option<&Path>, max_age_days: Option<i64>) -> Result<()> {
    let storage = super::open_storage(config, root)?;
    let max_age_days = max_age_days.unwrap_or(config.knowledge.max_age_days);

    if max_age_days <= 0 {
        println!("Pruning is disabled (max_age_days = {max_age_days}).");
        return Ok(());
    }

    let result = maintenance::sweep(&storage, max_age_days)?;

    if result.pruned == 0 {
        println!("No items older than {max_age_days} days.");
    } else {
        println!("Pruned {} item(s) older than {max_age_days} days:", result.pruned);
        for id in &result.pruned_ids {
            println!("  {id}");
        }
    }
    println!("{} item(s) remain.", result.remaining);
    Ok(())
}
