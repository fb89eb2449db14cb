pub mod checkpoints;
pub mod doctor;
pub mod items;
pub mod maintenance;
pub mod re_embed;
pub mod search;
pub mod stats;

use anyhow::{Context, Result};
use cairn::config::{CairnConfig, EmbeddingConfig};
use cairn::embedding::{local, EmbeddingProvider};
use cairn::storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Open the storage root given on the command line, or the configured one.
pub fn open_storage(config: &CairnConfig, root: Option<&Path>) -> Result<Storage> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => config.resolved_root(),
    };
    cairn::storage::open_storage(&root, &config.knowledge)
        .with_context(|| format!("failed to open storage at {}", root.display()))
}

/// The configured embedder, or `None` in keyword-only mode.
pub fn embedder(config: &CairnConfig) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    cairn::embedding::create_provider(&config.embedding)
        .context("failed to create embedding provider")
}

pub fn read_stdin() -> Result<String> {
    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .context("failed to read body from stdin")?;
    Ok(body)
}

/// Shorten `text` to at most `max` characters for one-line display.
pub fn preview(text: &str, max: usize) -> String {
    let line = text.trim().replace('\n', " ");
    match line.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &line[..end]),
        None => line,
    }
}

fn progress_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Download the ONNX embedding model and tokenizer to the cache directory.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let (model_path, tokenizer_path) = local::model_paths(config);
    if let Some(cache_dir) = model_path.parent() {
        std::fs::create_dir_all(cache_dir)
            .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;
    }

    if model_path.exists() {
        println!("Model already exists at {}", model_path.display());
    } else {
        println!("Downloading {} (~90MB)...", local::MODEL_FILE);
        download_file(MODEL_URL, &model_path).await?;
        println!("Model saved to {}", model_path.display());
    }

    if tokenizer_path.exists() {
        println!("Tokenizer already exists at {}", tokenizer_path.display());
    } else {
        println!("Downloading {}...", local::TOKENIZER_FILE);
        download_file(TOKENIZER_URL, &tokenizer_path).await?;
        println!("Tokenizer saved to {}", tokenizer_path.display());
    }

    println!("Model download complete. Set `[embedding] provider = \"local\"` to use it.");
    Ok(())
}

/// Stream a file to disk with a progress bar, via tmp + rename.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(progress_style(
                "  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})",
            ));
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
