//! Identifier sanitization and root containment checks.
//!
//! Every identifier that becomes part of a file name goes through [`sanitize`],
//! and every read or write goes through [`resolve_within`].

use std::path::{Component, Path, PathBuf};

use crate::error::ValidationError;

/// Replacement for identifiers that sanitize to nothing.
pub const PLACEHOLDER_ID: &str = "unnamed";

/// Reduce `raw` to `[A-Za-z0-9_-]+`.
///
/// Disallowed characters are dropped, and each run of them becomes a single
/// `-`. Leading and trailing `-` are trimmed. An empty result becomes
/// [`PLACEHOLDER_ID`].
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;

    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            if pending_dash && !out.is_empty() && !out.ends_with('-') && c != '-' {
                out.push('-');
            }
            pending_dash = false;
            if c == '-' && out.ends_with('-') {
                continue;
            }
            out.push(c);
        } else {
            pending_dash = true;
        }
    }

    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        PLACEHOLDER_ID.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether `id` is already in sanitized form.
pub fn is_sanitized(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Resolve `relative` against `root`, rejecting anything that lands outside it.
///
/// The check is lexical (`.` and `..` are folded without touching the disk),
/// followed by a canonical check on the deepest existing ancestor so a
/// symlink inside the root cannot point the write elsewhere. Nothing is read
/// or written here.
pub fn resolve_within(root: &Path, relative: impl AsRef<Path>) -> Result<PathBuf, ValidationError> {
    let relative = relative.as_ref();
    let escape = || ValidationError::PathEscape {
        root: root.to_path_buf(),
        path: relative.to_path_buf(),
    };

    if relative.is_absolute() {
        return Err(escape());
    }

    let root_abs = absolutize(root);
    let mut resolved = root_abs.clone();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved == root_abs || !resolved.pop() {
                    return Err(escape());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }

    if resolved == root_abs || !resolved.starts_with(&root_abs) {
        return Err(escape());
    }

    // Follow symlinks on whatever part of the path already exists.
    if let Ok(canonical_root) = root_abs.canonicalize() {
        if let Some(existing) = deepest_existing(&resolved) {
            if let Ok(canonical) = existing.canonicalize() {
                if !canonical.starts_with(&canonical_root) {
                    return Err(escape());
                }
            }
        }
    }

    Ok(resolved)
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn deepest_existing(path: &Path) -> Option<&Path> {
    let mut current = Some(path);
    while let Some(p) = current {
        if p.exists() {
            return Some(p);
        }
        current = p.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_safe_ids() {
        assert_eq!(sanitize("gdpr-consent"), "gdpr-consent");
        assert_eq!(sanitize("api_key_2"), "api_key_2");
    }

    #[test]
    fn sanitize_collapses_runs() {
        assert_eq!(sanitize("hello   world!!"), "hello-world");
        assert_eq!(sanitize("a/b\\c"), "a-b-c");
        assert_eq!(sanitize("a---b"), "a-b");
    }

    #[test]
    fn sanitize_strips_traversal() {
        let out = sanitize("../../etc/passwd");
        assert_eq!(out, "etc-passwd");
        assert!(!out.contains(".."));
        assert!(!out.contains('/'));
    }

    #[test]
    fn sanitize_empty_becomes_placeholder() {
        assert_eq!(sanitize(""), PLACEHOLDER_ID);
        assert_eq!(sanitize("../.."), PLACEHOLDER_ID);
        assert_eq!(sanitize("---"), PLACEHOLDER_ID);
        assert_eq!(sanitize("日本語"), PLACEHOLDER_ID);
    }

    #[test]
    fn sanitize_output_is_always_valid() {
        let inputs = [
            "", " ", "..", "/", "a b c", "-x-", "naïve café", "x/../y", "\0\n\t", "ok_id-1",
        ];
        for input in inputs {
            let out = sanitize(input);
            assert!(is_sanitized(&out), "{input:?} -> {out:?}");
            assert!(!out.starts_with('-') && !out.ends_with('-'), "{out:?}");
        }
    }

    #[test]
    fn resolve_within_accepts_descendants() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = resolve_within(tmp.path(), "global/item.md").unwrap();
        assert!(path.starts_with(tmp.path()));
        assert!(path.ends_with("global/item.md"));
    }

    #[test]
    fn resolve_within_folds_inner_parent_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = resolve_within(tmp.path(), "global/../skills/x.md").unwrap();
        assert!(path.ends_with("skills/x.md"));
    }

    #[test]
    fn resolve_within_rejects_escapes() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(resolve_within(tmp.path(), "../outside.md").is_err());
        assert!(resolve_within(tmp.path(), "global/../../outside.md").is_err());
        assert!(resolve_within(tmp.path(), "/etc/passwd").is_err());
        assert!(resolve_within(tmp.path(), "").is_err());
        assert!(resolve_within(tmp.path(), ".").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn resolve_within_rejects_symlink_escape() {
        let tmp = tempfile::TempDir::new().unwrap();
        let outside = tempfile::TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();
        assert!(resolve_within(tmp.path(), "link/file.md").is_err());
    }
}
