use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_generation_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks selected as grounding context per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_top_k() -> usize {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "openai" => {}
        other => anyhow::bail!("Unknown embedding provider: '{}'. Must be openai.", other),
    }
    match config.generation.provider.as_str() {
        "openai" => {}
        other => anyhow::bail!("Unknown generation provider: '{}'. Must be openai.", other),
    }

    Ok(config)
}
