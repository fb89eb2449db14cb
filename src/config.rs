use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CairnConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub knowledge: KnowledgeConfig,
    pub recall: RecallConfig,
    pub checkpoints: CheckpointConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Global storage root.
    pub root: String,
}

/// Retention and caching policy for one storage root.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Items older than this are pruned by the sweep; 0 disables pruning.
    pub max_age_days: i64,
    /// Run the sweep after every add.
    pub maintenance_on_save: bool,
    pub cache_ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecallConfig {
    pub max_items: usize,
    pub token_budget: usize,
    #[serde(rename = "quick")]
    pub quick_threshold: f64,
    #[serde(rename = "standard")]
    pub standard_threshold: f64,
    #[serde(rename = "deep")]
    pub deep_threshold: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CheckpointConfig {
    pub dedup_threshold: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `none`, `hash` or `local`.
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_cairn_dir().to_string_lossy().into_owned(),
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            max_age_days: 0,
            maintenance_on_save: false,
            cache_ttl_seconds: 30,
        }
    }
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            max_items: 5,
            token_budget: 2000,
            quick_threshold: 4.0,
            standard_threshold: 2.0,
            deep_threshold: 1.0,
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: 0.85,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_cairn_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "hash".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
        }
    }
}

/// Returns `~/.cairn/`, or `./.cairn` when there is no home directory.
pub fn default_cairn_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cairn")
}

/// Returns the default config file path: `~/.cairn/config.toml`
pub fn default_config_path() -> PathBuf {
    default_cairn_dir().join("config.toml")
}

impl CairnConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            CairnConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (CAIRN_HOME, CAIRN_LOG_LEVEL, CAIRN_EMBEDDING).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CAIRN_HOME") {
            self.storage.root = val;
        }
        if let Ok(val) = std::env::var("CAIRN_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("CAIRN_EMBEDDING") {
            self.embedding.provider = val;
        }
    }

    /// Resolve the global storage root, expanding `~` if needed.
    pub fn resolved_root(&self) -> PathBuf {
        expand_tilde(&self.storage.root)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
