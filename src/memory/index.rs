//! The item index: one JSON file per storage root, read through a TTL cache.
//!
//! The cache is owned by the [`IndexStore`] (not global), and can be shared or
//! swapped via [`IndexStore::with_cache`]. The lock covers only the
//! snapshot/timestamp check and swap; disk reads happen outside it, so two
//! readers may race to reload. A generation counter keeps a reload that
//! started before an `invalidate()` from re-installing pre-write data.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;

use crate::memory::types::ItemRecord;
use crate::storage::guard::is_sanitized;
use crate::storage::write_atomic;

/// Index file format version.
pub const INDEX_VERSION: u32 = 1;

/// Immutable view of the index as of one load.
pub type Snapshot = Arc<Vec<ItemRecord>>;

#[derive(Default)]
struct CacheState {
    snapshot: Option<Snapshot>,
    loaded_at: Option<Instant>,
    generation: u64,
}

/// A single cached index snapshot plus its load time.
pub struct IndexCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl IndexCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached snapshot if it is younger than the TTL, else the current
    /// generation for a subsequent [`put`](Self::put).
    fn lookup(&self) -> Result<Snapshot, u64> {
        let state = self.state.lock();
        match (&state.snapshot, state.loaded_at) {
            (Some(snapshot), Some(loaded_at)) if loaded_at.elapsed() <= self.ttl => {
                Ok(Arc::clone(snapshot))
            }
            _ => Err(state.generation),
        }
    }

    fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Install a freshly read snapshot unless the cache was invalidated since
    /// `generation` was observed.
    fn put(&self, generation: u64, snapshot: Snapshot) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.snapshot = Some(snapshot);
            state.loaded_at = Some(Instant::now());
        }
    }

    /// Drop the snapshot; the next load goes to disk.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.snapshot = None;
        state.loaded_at = None;
        state.generation = state.generation.wrapping_add(1);
    }

    /// Whether a snapshot is currently held (fresh or not).
    pub fn is_populated(&self) -> bool {
        self.state.lock().snapshot.is_some()
    }
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    version: u32,
    items: &'a [ItemRecord],
}

/// Authoritative item list for one storage root.
pub struct IndexStore {
    path: PathBuf,
    cache: Arc<IndexCache>,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self::with_cache(path, Arc::new(IndexCache::new(ttl)))
    }

    pub fn with_cache(path: impl Into<PathBuf>, cache: Arc<IndexCache>) -> Self {
        Self {
            path: path.into(),
            cache,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cache(&self) -> &Arc<IndexCache> {
        &self.cache
    }

    /// Current items, from cache when fresh.
    pub fn load(&self) -> Snapshot {
        self.load_with(false)
    }

    /// Current items, always read from disk (and re-cached).
    pub fn load_fresh(&self) -> Snapshot {
        self.load_with(true)
    }

    pub fn load_with(&self, bypass_cache: bool) -> Snapshot {
        let generation = match self.cache.lookup() {
            Ok(snapshot) if !bypass_cache => {
                tracing::debug!(path = %self.path.display(), "index cache hit");
                return snapshot;
            }
            // A bypassing read of a still-fresh cache refreshes it too.
            Ok(_) => self.cache.generation(),
            Err(generation) => generation,
        };

        tracing::debug!(path = %self.path.display(), "index cache miss, reading from disk");
        let snapshot: Snapshot = Arc::new(read_index_file(&self.path));
        self.cache.put(generation, Arc::clone(&snapshot));
        snapshot
    }

    /// Items read straight from disk for a read-modify-write.
    ///
    /// Unlike [`load`](Self::load), an index that exists but cannot be read
    /// or parsed is an error, so the caller never saves over it. If some
    /// entries were skipped as malformed, the file is first copied to
    /// `index.json.skipped-<timestamp>` so the next save does not lose them.
    pub fn load_for_update(&self) -> Result<Vec<ItemRecord>> {
        let generation = self.cache.generation();
        let decoded = decode_index_file(&self.path).context(
            "refusing to modify an index that cannot be read; repair or move it aside first",
        )?;
        if decoded.skipped > 0 {
            let backup = preserve_copy(&self.path, "skipped")?;
            tracing::warn!(
                skipped = decoded.skipped,
                backup = %backup.display(),
                "index has malformed entries, original preserved before rewrite"
            );
        }
        self.cache.put(generation, Arc::new(decoded.items.clone()));
        Ok(decoded.items)
    }

    /// Decode the file without touching the cache. `Ok` holds the number of
    /// entries that would be skipped.
    pub fn verify(&self) -> Result<usize> {
        decode_index_file(&self.path).map(|decoded| decoded.skipped)
    }

    /// Persist `items` atomically, then invalidate the cache.
    pub fn save(&self, items: &[ItemRecord]) -> Result<()> {
        let file = IndexFileRef {
            version: INDEX_VERSION,
            items,
        };
        let json = serde_json::to_vec_pretty(&file).context("failed to serialize index")?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("failed to write index {}", self.path.display()))?;
        self.cache.invalidate();
        tracing::debug!(path = %self.path.display(), items = items.len(), "index saved");
        Ok(())
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Look up one item by ID in the current snapshot.
    pub fn get(&self, id: &str) -> Option<ItemRecord> {
        self.load().iter().find(|item| item.id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.load().iter().any(|item| item.id == id)
    }
}

/// Read and decode the index file, skipping entries that do not decode.
///
/// A missing file is an empty index. An unreadable or unparseable file is
/// logged and treated as empty; writers use [`IndexStore::load_for_update`]
/// instead, which refuses to go on.
pub fn read_index_file(path: &Path) -> Vec<ItemRecord> {
    match decode_index_file(path) {
        Ok(decoded) => decoded.items,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "index unusable, reading as empty");
            Vec::new()
        }
    }
}

struct DecodedIndex {
    items: Vec<ItemRecord>,
    skipped: usize,
}

/// Missing file: empty. Unreadable file or bad document shape: `Err`.
/// Individual entries that do not decode are skipped and counted.
fn decode_index_file(path: &Path) -> Result<DecodedIndex> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(DecodedIndex {
                items: Vec::new(),
                skipped: 0,
            })
        }
        Err(e) => return Err(e).with_context(|| format!("failed to read index {}", path.display())),
    };

    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("index {} is not valid JSON", path.display()))?;

    let entries = match value {
        serde_json::Value::Object(mut map) => match map.remove("items") {
            Some(serde_json::Value::Array(items)) => items,
            _ => anyhow::bail!("index {} has no items array", path.display()),
        },
        // Early indexes were a bare array.
        serde_json::Value::Array(items) => items,
        _ => anyhow::bail!("index {} has unexpected shape", path.display()),
    };

    let total = entries.len();
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(total);
    for (position, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<ItemRecord>(entry) {
            Ok(item) if !is_sanitized(&item.id) => {
                tracing::warn!(position, id = %item.id, "skipping index entry with unsafe id");
            }
            Ok(item) if !seen.insert(item.id.clone()) => {
                tracing::warn!(position, id = %item.id, "skipping duplicate index entry");
            }
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::warn!(position, error = %e, "skipping malformed index entry");
            }
        }
    }
    let skipped = total - items.len();
    Ok(DecodedIndex { items, skipped })
}

/// Copy `path` to `<path>.<suffix>-<timestamp>`, keeping the original.
fn preserve_copy(path: &Path, suffix: &str) -> Result<PathBuf> {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{suffix}-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S")));
    let backup = PathBuf::from(name);
    std::fs::copy(path, &backup)
        .with_context(|| format!("failed to copy {} to {}", path.display(), backup.display()))?;
    Ok(backup)
}
