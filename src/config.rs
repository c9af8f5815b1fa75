use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Pool size. Answering, indexing, and the HTTP server share the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a writer waits on a locked database before erroring.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout_secs() -> u64 {
    5
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
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Normalized-score threshold for a `high` confidence label.
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
    /// Normalized-score threshold for a `medium` confidence label.
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_high_threshold() -> f64 {
    0.85
}
fn default_medium_threshold() -> f64 {
    0.70
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai` (hosted, requires API key) or `self-hosted` (no key).
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            dims: default_dims(),
            timeout_secs: default_embed_timeout_secs(),
            max_retries: default_max_retries(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `openai` (hosted, requires API key) or `self-hosted` (no key).
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_embedding_base_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_max_tokens() -> u32 {
    700
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    /// Maximum number of recent turns included in a prompt.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Turns older than this are no longer considered part of the
    /// active conversation.
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: i64,
    /// Optional character budget for rendered history. Truncation drops
    /// the oldest turns first.
    #[serde(default)]
    pub max_context_chars: Option<usize>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            timeout_minutes: default_timeout_minutes(),
            max_context_chars: None,
        }
    }
}

fn default_window() -> usize {
    10
}
fn default_timeout_minutes() -> i64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.max_connections < 1 {
        anyhow::bail!("db.max_connections must be >= 1");
    }

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    for (name, v) in [
        ("retrieval.high_threshold", config.retrieval.high_threshold),
        ("retrieval.medium_threshold", config.retrieval.medium_threshold),
    ] {
        if !(0.0..=1.0).contains(&v) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }
    if config.retrieval.medium_threshold > config.retrieval.high_threshold {
        anyhow::bail!("retrieval.medium_threshold must be <= retrieval.high_threshold");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    for (name, provider) in [
        ("embedding.provider", config.embedding.provider.as_str()),
        ("llm.provider", config.llm.provider.as_str()),
    ] {
        match provider {
            "openai" | "self-hosted" => {}
            other => anyhow::bail!("Unknown {}: '{}'. Must be openai or self-hosted.", name, other),
        }
    }

    if config.memory.window < 1 {
        anyhow::bail!("memory.window must be >= 1");
    }
    if config.memory.timeout_minutes < 1 {
        anyhow::bail!("memory.timeout_minutes must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: Config = toml::from_str("[db]\npath = \"/tmp/deskmate.sqlite\"\n").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.db.max_connections, 5);
        assert_eq!(config.db.busy_timeout_secs, 5);
        assert_eq!(config.chunking.max_chars, 1000);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.memory.window, 10);
        assert!(config.memory.max_context_chars.is_none());
        assert_eq!(config.embedding.provider, "openai");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_budget() {
        let config: Config = toml::from_str(
            "[db]\npath = \"x\"\n[chunking]\nmax_chars = 100\noverlap_chars = 100\n",
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        let config: Config = toml::from_str(
            "[db]\npath = \"x\"\n[retrieval]\nhigh_threshold = 0.5\nmedium_threshold = 0.9\n",
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let config: Config =
            toml::from_str("[db]\npath = \"x\"\nmax_connections = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config: Config =
            toml::from_str("[db]\npath = \"x\"\n[embedding]\nprovider = \"duck\"\n").unwrap();
        assert!(validate(&config).is_err());
    }
}
