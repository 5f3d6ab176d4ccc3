//! Configuration module
//!
//! Read from `.teamfacts/config.toml` (nearest one walking up from the
//! current directory), then `~/.teamfacts/config.toml`, then defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::service::ServiceOptions;

/// Directory name holding config and databases
pub const DIR_NAME: &str = ".teamfacts";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Recorded as `created_by` on facts and `made_by` on decisions
    #[serde(default)]
    pub name: String,

    /// Team partition used when `--team` is not given
    #[serde(default = "default_team")]
    pub team: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            team: default_team(),
        }
    }
}

fn default_team() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database path; `TEAMFACTS_DATABASE` wins over it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,

    /// How long a fact may wait for confirmation
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_secs: u64,

    #[serde(default)]
    pub reembed_on_update: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: None,
            pending_ttl_secs: default_pending_ttl(),
            reembed_on_update: false,
        }
    }
}

fn default_pending_ttl() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default)]
    pub min_similarity: f32,

    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    #[serde(default = "default_conflict_candidates")]
    pub conflict_candidates: usize,

    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            min_similarity: 0.0,
            token_budget: default_token_budget(),
            conflict_candidates: default_conflict_candidates(),
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_limit() -> usize {
    10
}

fn default_token_budget() -> usize {
    2000
}

fn default_conflict_candidates() -> usize {
    5
}

fn default_min_confidence() -> f32 {
    0.6
}

/// Which collaborators back embeddings, extraction and judgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    /// No embeddings, sentence extractor, heuristic judge
    #[default]
    None,
    /// Hashing embedder, sentence extractor, heuristic judge
    Local,
    /// OpenAI-compatible HTTP service for all three
    Openai,
}

impl std::str::FromStr for AiProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(AiProvider::None),
            "local" => Ok(AiProvider::Local),
            "openai" => Ok(AiProvider::Openai),
            _ => anyhow::bail!("Unknown AI provider: {}. Use none, local or openai.", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub provider: AiProvider,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; `TEAMFACTS_API_KEY` is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Vector size of the `local` embedder
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::default(),
            base_url: default_base_url(),
            api_key: None,
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            timeout_secs: default_timeout_secs(),
            embedding_dim: default_embedding_dim(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_embedding_dim() -> usize {
    256
}

impl AiConfig {
    /// Key from config, else from `TEAMFACTS_API_KEY`
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("TEAMFACTS_API_KEY").ok().filter(|k| !k.is_empty()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Config {
    /// Load config: explicit path, else local, else global, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        if let Some(local) = Self::find_local_config() {
            return Self::load_from(&local);
        }

        if let Some(global) = Self::global_config_path() {
            if global.exists() {
                return Self::load_from(&global);
            }
        }

        Ok(Self::default())
    }

    /// Load config from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Find the nearest `.teamfacts` directory walking up from CWD
    pub fn find_local_dir() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            let dir = current.join(DIR_NAME);
            if dir.is_dir() {
                return Some(dir);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Find local .teamfacts/config.toml walking up directories
    pub fn find_local_config() -> Option<PathBuf> {
        Self::find_local_dir()
            .map(|d| d.join("config.toml"))
            .filter(|p| p.exists())
    }

    /// `~/.teamfacts`
    pub fn global_dir() -> Option<PathBuf> {
        directories::UserDirs::new().map(|u| u.home_dir().join(DIR_NAME))
    }

    /// Get global config path (~/.teamfacts/config.toml)
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|d| d.join("config.toml"))
    }

    /// Database path with priority:
    /// 1. TEAMFACTS_DATABASE env var
    /// 2. `[store] database`
    /// 3. Local .teamfacts/data.db (walking up from CWD)
    /// 4. Global ~/.teamfacts/data.db
    pub fn database_path(&self) -> PathBuf {
        if let Ok(env_path) = std::env::var("TEAMFACTS_DATABASE") {
            if !env_path.is_empty() {
                return PathBuf::from(env_path);
            }
        }

        if let Some(db) = &self.store.database {
            return db.clone();
        }

        if let Some(local) = Self::find_local_dir() {
            return local.join("data.db");
        }

        if let Some(global) = Self::global_dir() {
            return global.join("data.db");
        }

        PathBuf::from(DIR_NAME).join("data.db")
    }

    /// Pending confirmations live next to the fact database
    pub fn pending_path(&self) -> PathBuf {
        pending_path_for(&self.database_path())
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            external_timeout: self.ai.timeout(),
            min_confidence: self.search.min_confidence,
            conflict_candidates: self.search.conflict_candidates,
            pending_ttl: Duration::from_secs(self.store.pending_ttl_secs),
            reembed_on_update: self.store.reembed_on_update,
            min_similarity: self.search.min_similarity,
            default_limit: self.search.default_limit,
            token_budget: self.search.token_budget,
        }
    }
}

/// `pending.db` in the same directory as `db`
pub fn pending_path_for(db: &Path) -> PathBuf {
    match db.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join("pending.db"),
        _ => PathBuf::from("pending.db"),
    }
}
