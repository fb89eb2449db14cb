//! Item bodies on disk: a YAML header between `---` lines, then the body.
//!
//! Files without a complete header are legacy bodies and read back whole.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::guard::resolve_within;
use super::write_atomic;

/// Line that opens and closes the header block.
pub const SENTINEL: &str = "---";

/// Structured header fields.
pub type Frontmatter = BTreeMap<String, serde_yaml::Value>;

/// Write `header` and `body` to `root/relative`, replacing any existing file.
///
/// Returns the absolute path written.
pub fn write_content(
    root: &Path,
    relative: &Path,
    header: &Frontmatter,
    body: &str,
) -> Result<PathBuf> {
    let path = resolve_within(root, relative)?;
    let rendered = render(header, body)?;
    write_atomic(&path, rendered.as_bytes())?;
    Ok(path)
}

/// Read a content file and split it into header and body.
pub fn read_content(path: &Path) -> Result<(Frontmatter, String)> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(split_frontmatter(&raw))
}

/// Read a content file under `root`, refusing paths that leave it.
pub fn read_content_within(root: &Path, relative: &Path) -> Result<(Frontmatter, String)> {
    let path = resolve_within(root, relative)?;
    read_content(&path)
}

/// Serialize a header and body into file text.
pub fn render(header: &Frontmatter, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(header).context("failed to serialize header")?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 8);
    out.push_str(SENTINEL);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(SENTINEL);
    out.push('\n');
    out.push_str(body);
    Ok(out)
}

/// Split file text into header and body.
///
/// A missing opening sentinel, a missing closing sentinel, or a header that
/// is not a YAML mapping all yield an empty header and the whole text as body.
pub fn split_frontmatter(raw: &str) -> (Frontmatter, String) {
    let legacy = || (Frontmatter::new(), raw.to_string());

    let Some(rest) = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))
    else {
        return legacy();
    };

    let mut offset = 0;
    let mut closing = None;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\n', '\r']) == SENTINEL {
            closing = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }

    let Some((header_end, body_start)) = closing else {
        return legacy();
    };

    let header_text = &rest[..header_end];
    let header = if header_text.trim().is_empty() {
        Frontmatter::new()
    } else {
        match serde_yaml::from_str::<Frontmatter>(header_text) {
            Ok(header) => header,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable header, treating file as legacy body");
                return legacy();
            }
        }
    };

    (header, rest[body_start..].to_string())
}
