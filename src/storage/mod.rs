//! Storage root layout and atomic file I/O.
//!
//! A storage root (global or per-project) looks like:
//!
//! ```text
//! <root>/
//!   index.json                     item records
//!   global/<id>.md                 unscoped item bodies
//!   skills/<skill>/<id>.md         skill-scoped item bodies
//!   embeddings/<collection>.vec    raw f32 matrix
//!   embeddings/<collection>.ids    parallel id list
//!   checkpoints/<ts>_<slug>.json   one file per checkpoint
//! ```
//!
//! [`Storage`] is the handle the rest of the crate passes around, the same way
//! a database connection would be.

pub mod content;
pub mod guard;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::KnowledgeConfig;
use crate::memory::index::IndexStore;
use crate::memory::search::TriggerCache;

pub const INDEX_FILE: &str = "index.json";
pub const GLOBAL_DIR: &str = "global";
pub const SKILLS_DIR: &str = "skills";
pub const EMBEDDINGS_DIR: &str = "embeddings";
pub const CHECKPOINTS_DIR: &str = "checkpoints";

/// Vector collection holding knowledge item embeddings.
pub const KNOWLEDGE_COLLECTION: &str = "knowledge";
/// Vector collection holding checkpoint thesis embeddings.
pub const CHECKPOINT_COLLECTION: &str = "checkpoints";

/// An opened storage root.
pub struct Storage {
    root: PathBuf,
    index: IndexStore,
    triggers: TriggerCache,
    policy: KnowledgeConfig,
}

impl Storage {
    /// Build a handle around an existing index store, e.g. one sharing its
    /// cache with another handle.
    pub fn with_index(root: PathBuf, index: IndexStore, policy: KnowledgeConfig) -> Self {
        Self {
            root,
            index,
            triggers: TriggerCache::default(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &IndexStore {
        &self.index
    }

    /// Compiled recall triggers for the current index snapshot.
    pub fn trigger_cache(&self) -> &TriggerCache {
        &self.triggers
    }

    pub fn policy(&self) -> &KnowledgeConfig {
        &self.policy
    }

    pub fn embeddings_dir(&self) -> PathBuf {
        self.root.join(EMBEDDINGS_DIR)
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join(CHECKPOINTS_DIR)
    }
}

/// Open (or create) a storage root, creating its directory skeleton.
pub fn open_storage(root: impl AsRef<Path>, policy: &KnowledgeConfig) -> Result<Storage> {
    let root = root.as_ref();

    for dir in [
        root.to_path_buf(),
        root.join(GLOBAL_DIR),
        root.join(SKILLS_DIR),
        root.join(EMBEDDINGS_DIR),
        root.join(CHECKPOINTS_DIR),
    ] {
        create_private_dir(&dir)?;
    }

    let ttl = Duration::from_secs(policy.cache_ttl_seconds);
    let index = IndexStore::new(root.join(INDEX_FILE), ttl);

    tracing::info!(root = %root.display(), "storage root ready");
    Ok(Storage::with_index(root.to_path_buf(), index, policy.clone()))
}

/// Create a directory (and parents) readable only by the owner.
pub fn create_private_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("failed to set permissions on {}", dir.display()))?;
    }
    Ok(())
}

/// Replace `path` with `bytes` atomically.
///
/// Writes a temp file next to the destination, restricts it to the owner,
/// syncs it and renames it over `path`. A reader sees either the old file or
/// the new one, never a partial write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    anyhow::ensure!(
        !path.as_os_str().is_empty(),
        "destination path cannot be empty"
    );
    anyhow::ensure!(
        !path.is_dir(),
        "destination path {} is a directory",
        path.display()
    );

    let parent = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("cairn");
    let tmp_path = parent.join(format!(".{file_name}.tmp-{}", uuid::Uuid::now_v7()));

    let result = (|| -> Result<()> {
        let mut file = std::fs::File::create(&tmp_path)
            .with_context(|| format!("failed to create temp file {}", tmp_path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(bytes)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_layout() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("store");
        let storage = open_storage(&root, &KnowledgeConfig::default()).unwrap();

        for dir in [GLOBAL_DIR, SKILLS_DIR, EMBEDDINGS_DIR, CHECKPOINTS_DIR] {
            assert!(root.join(dir).is_dir(), "{dir} should exist");
        }
        assert_eq!(storage.root(), root.as_path());
        assert_eq!(storage.index().path(), root.join(INDEX_FILE).as_path());
    }

    #[test]
    fn write_atomic_replaces_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("file.txt");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "temp files should not remain");
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("secret.md");
        write_atomic(&path, b"body").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn write_atomic_rejects_directory_target() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(write_atomic(tmp.path(), b"x").is_err());
    }
}
