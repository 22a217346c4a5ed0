//! Configuration parsing and validation.
//!
//! `docret` is configured via a TOML file (default: `config/docret.toml`). The
//! config defines the database path, embedding/generation client settings,
//! retrieval pool sizing, and the optional reranker endpoint.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,
    pub model: String,
    pub dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_batch_size() -> usize {
    20
}

/// Generation client settings, used only by the query expander. Disabled by
/// default — expansion degrades to `[original]` when no model is configured.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_embedding_url")]
    pub url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_num_variations")]
    pub num_variations: usize,
}

fn default_num_variations() -> usize {
    3
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_embedding_url(),
            model: None,
            timeout_secs: default_timeout_secs(),
            num_variations: default_num_variations(),
        }
    }
}

/// Cross-encoder reranker settings. Disabled by default — the searcher falls
/// back to RRF-only scoring with a warning if a rerank is requested anyway.
#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_embedding_url")]
    pub url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_embedding_url(),
            model: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Pool-sizing knobs for hybrid search. The RRF weights themselves
/// (`RRF_K`, `W_SEM`, `W_KW`, `SECTION_BOOST`) are fixed constants in
/// [`crate::search`], not configurable — the spec pins their values.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_pool_min")]
    pub pool_min: i64,
    #[serde(default = "default_pool_max")]
    pub pool_max: i64,
    #[serde(default = "default_rerank_pool_cap")]
    pub rerank_pool_cap: i64,
}

fn default_pool_min() -> i64 {
    100
}
fn default_pool_max() -> i64 {
    200
}
fn default_rerank_pool_cap() -> i64 {
    50
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            pool_min: default_pool_min(),
            pool_max: default_pool_max(),
            rerank_pool_cap: default_rerank_pool_cap(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.model.trim().is_empty() {
        anyhow::bail!("embedding.model must be set");
    }
    if config.retrieval.pool_min > config.retrieval.pool_max {
        anyhow::bail!("retrieval.pool_min must be <= retrieval.pool_max");
    }
    if config.generation.enabled && config.generation.model.is_none() {
        anyhow::bail!("generation.model must be set when generation.enabled = true");
    }
    if config.rerank.enabled && config.rerank.model.is_none() {
        anyhow::bail!("rerank.model must be set when rerank.enabled = true");
    }

    Ok(config)
}
