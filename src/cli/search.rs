use std::path::Path;

use anyhow::Result;
use cairn::config::CairnConfig;
use cairn::memory::search::{RecallDepth, RecallMode, RecallRequest};
use cairn::memory::types::{ItemType, Status};

use super::{embedder, open_storage, preview};

pub struct RecallOptions {
    pub depth: RecallDepth,
    pub scope: Option<String>,
    pub types: Vec<ItemType>,
    pub max_items: Option<usize>,
    pub keyword_only: bool,
    pub json: bool,
}

/// Run a recall from the terminal.
pub async fn recall(
    config: &CairnConfig,
    root: Option<&Path>,
    query: &str,
    options: RecallOptions,
) -> Result<()> {
    let storage = open_storage(config, root)?;
    let embedder = if options.keyword_only {
        None
    } else {
        embedder(config)?
    };

    let mut request = RecallRequest::for_depth(query, options.depth, &config.recall);
    request.scope = options.scope;
    if !options.types.is_empty() {
        request.allowed_types = Some(options.types);
    }
    if let Some(max_items) = options.max_items {
        request.max_items = max_items;
    }

    // Embedding can block for seconds.
    let response = tokio::task::spawn_blocking(move || {
        cairn::memory::search::recall(&storage, &request, embedder.as_deref())
    })
    .await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    let mode = match response.mode {
        RecallMode::Keyword => "keyword",
        RecallMode::Semantic => "semantic",
    };
    println!(
        "Found {} result(s), {} matched, {mode} mode (token estimate: ~{})\n",
        response.results.len(),
        response.total_matched,
        response.token_estimate
    );

    for (i, result) in response.results.iter().enumerate() {
        let status = match result.item.metadata.status {
            Status::Active => String::new(),
            other => format!(", {other}"),
        };
        println!(
            "  {}. [{}] {} (score: {:.3}{status})",
            i + 1,
            result.item.metadata.item_type,
            result.item.id,
            result.score,
        );
        println!("     {}", preview(&result.content, 120));
        println!();
    }

    Ok(())
}
