use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// SQLite index path.
    pub db_path: PathBuf,
    /// Embedding cache directory (one file per content hash).
    pub cache_dir: PathBuf,
    #[serde(default = "default_collection")]
    pub collection_name: String,
}

fn default_collection() -> String {
    "documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
    /// Base URL for the ollama provider.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            timeout_secs: default_embed_timeout(),
            base_url: default_ollama_url(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_timeout() -> u64 {
    30
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
            base_url: default_ollama_url(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_llm_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_min_file_bytes")]
    pub min_file_bytes: u64,
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            min_file_bytes: default_min_file_bytes(),
            min_query_chars: default_min_query_chars(),
            max_query_chars: default_max_query_chars(),
            max_results: default_max_results(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    35 * 1024 * 1024
}
fn default_min_file_bytes() -> u64 {
    10
}
fn default_min_query_chars() -> usize {
    3
}
fn default_max_query_chars() -> usize {
    1000
}
fn default_max_results() -> usize {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be < chunking.chunk_size");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai or ollama.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        anyhow::bail!(
            "embedding.dims must be > 0 for provider '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "openai" | "anthropic" | "deepseek" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be openai, anthropic, deepseek, or ollama.",
            other
        ),
    }

    // Validate limits
    if config.limits.min_query_chars == 0
        || config.limits.min_query_chars > config.limits.max_query_chars
    {
        anyhow::bail!("limits.min_query_chars must be in [1, max_query_chars]");
    }
    if config.limits.max_results == 0 {
        anyhow::bail!("limits.max_results must be >= 1");
    }
    if config.limits.min_file_bytes > config.limits.max_file_bytes {
        anyhow::bail!("limits.min_file_bytes must be <= limits.max_file_bytes");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("docqa.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn minimal_toml() -> String {
        r#"
[storage]
db_path = "./data/docqa.sqlite"
cache_dir = "./data/embedding_cache"

[server]
bind = "127.0.0.1:8000"
"#
        .to_string()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), &minimal_toml());
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 1000);
        assert_eq!(cfg.chunking.chunk_overlap, 200);
        assert_eq!(cfg.embedding.provider, "openai");
        assert_eq!(cfg.limits.max_file_bytes, 35 * 1024 * 1024);
        assert_eq!(cfg.limits.min_query_chars, 3);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let tmp = tempfile::tempdir().unwrap();
        let body = format!(
            "{}\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
            minimal_toml()
        );
        let path = write_config(tmp.path(), &body);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let body = format!("{}\n[llm]\nprovider = \"cohere\"\n", minimal_toml());
        let path = write_config(tmp.path(), &body);
        assert!(load_config(&path).is_err());
    }
}
