use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub loaders: LoadersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    800
}
fn default_overlap_chars() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    6
}
fn default_max_context_chars() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub endpoint_url: String,
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_key_env")]
    pub api_key_env: String,
}

fn default_batch_size() -> usize {
    64
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_key_env() -> String {
    "LANTERN_EMBED_API_KEY".to_string()
}

/// Generation endpoint settings. An absent `endpoint_url` is a valid state:
/// `ask` then runs in retrieval-only (degraded) mode.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            model: default_generation_model(),
            timeout_secs: default_generation_timeout_secs(),
            api_key_env: default_generation_key_env(),
        }
    }
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_generation_key_env() -> String {
    "LANTERN_LLM_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoadersConfig {
    pub filesystem: Option<FilesystemLoaderConfig>,
    pub tracker: Option<TrackerLoaderConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemLoaderConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerLoaderConfig {
    #[serde(default = "default_tracker_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub project_gid: Option<String>,
    #[serde(default)]
    pub workspace_gid: Option<String>,
    #[serde(default)]
    pub user_gid: Option<String>,
    #[serde(default = "default_tracker_limit")]
    pub limit: usize,
    #[serde(default = "default_tracker_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_tracker_token_env")]
    pub token_env: String,
}

fn default_tracker_base_url() -> String {
    "https://app.asana.com/api/1.0".to_string()
}
fn default_tracker_limit() -> usize {
    200
}
fn default_tracker_timeout_secs() -> u64 {
    30
}
fn default_tracker_token_env() -> String {
    "LANTERN_TRACKER_TOKEN".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::Configuration(format!("failed to parse config file: {}", e)))?;

    validate(&config)?;
    Ok(config)
}

/// Validate field combinations once at startup.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        return Err(Error::Configuration("chunking.max_chars must be > 0".into()));
    }

    if config.chunking.overlap_chars >= config.chunking.max_chars {
        return Err(Error::Configuration(format!(
            "chunking.overlap_chars ({}) must be smaller than chunking.max_chars ({})",
            config.chunking.overlap_chars, config.chunking.max_chars
        )));
    }

    if config.retrieval.top_k == 0 {
        return Err(Error::Configuration("retrieval.top_k must be >= 1".into()));
    }

    if config.retrieval.max_context_chars == 0 {
        return Err(Error::Configuration(
            "retrieval.max_context_chars must be > 0".into(),
        ));
    }

    if config.embedding.batch_size == 0 || config.embedding.batch_size > 100 {
        return Err(Error::Configuration(format!(
            "embedding.batch_size must be in 1..=100, got {}",
            config.embedding.batch_size
        )));
    }

    if let Some(tracker) = &config.loaders.tracker {
        let has_project = tracker.project_gid.is_some();
        let has_user_search = tracker.workspace_gid.is_some() && tracker.user_gid.is_some();
        if !has_project && !has_user_search {
            return Err(Error::Configuration(
                "loaders.tracker needs project_gid, or workspace_gid together with user_gid".into(),
            ));
        }
    }

    Ok(())
}
