//! Embedding providers and vector utilities.
//!
//! The provider is a closed set of variants selected once at startup from
//! configuration — no string dispatch in the request path:
//! - **OpenAI** — `POST /v1/embeddings`, keyed by `OPENAI_API_KEY`.
//! - **Ollama** — `POST /api/embed` against a local or remote daemon.
//!
//! Each embedding call is a single attempt with a configured timeout;
//! retry policy, if any, belongs to the transport layer above.
//!
//! [`CachedEmbedder`] wraps a provider with the content-addressed
//! [`EmbeddingCache`]: batch calls compute only the texts missing from the
//! cache and merge cached and fresh vectors back into input order.
//!
//! Vector utilities for the SQLite index:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`] — decode a BLOB back into a `Vec<f32>`

use anyhow::{bail, Result};
use std::time::Duration;

use crate::cache::EmbeddingCache;
use crate::config::EmbeddingConfig;

/// An embedding backend, selected once at startup.
pub enum EmbeddingProvider {
    OpenAi {
        model: String,
        dims: usize,
        api_key: String,
        timeout: Duration,
    },
    Ollama {
        model: String,
        dims: usize,
        base_url: String,
        timeout: Duration,
    },
}

impl EmbeddingProvider {
    /// Build the configured provider.
    ///
    /// The OpenAI variant requires `OPENAI_API_KEY` in the environment.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        match config.provider.as_str() {
            "openai" => {
                let api_key = std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
                Ok(Self::OpenAi {
                    model: config.model.clone(),
                    dims: config.dims,
                    api_key,
                    timeout,
                })
            }
            "ollama" => Ok(Self::Ollama {
                model: config.model.clone(),
                dims: config.dims,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                timeout,
            }),
            other => bail!("Unknown embedding provider: {}", other),
        }
    }

    /// The model identifier (e.g. `"text-embedding-3-small"`).
    pub fn model_name(&self) -> &str {
        match self {
            Self::OpenAi { model, .. } | Self::Ollama { model, .. } => model,
        }
    }

    /// The embedding vector dimensionality.
    pub fn dims(&self) -> usize {
        match self {
            Self::OpenAi { dims, .. } | Self::Ollama { dims, .. } => *dims,
        }
    }

    /// Embed a batch of texts, one vector per input in input order.
    /// A single attempt; provider failures propagate to the caller.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = match self {
            Self::OpenAi {
                model,
                api_key,
                timeout,
                ..
            } => embed_openai(model, api_key, *timeout, texts).await?,
            Self::Ollama {
                model,
                base_url,
                timeout,
                ..
            } => embed_ollama(model, base_url, *timeout, texts).await?,
        };

        if vectors.len() != texts.len() {
            bail!(
                "embedding provider returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            );
        }
        // A wrong dimensionality would silently score 0 against every
        // stored vector; fail loudly instead.
        let dims = self.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            bail!(
                "embedding provider returned {}-dimensional vector, expected {}",
                bad.len(),
                dims
            );
        }
        Ok(vectors)
    }
}

async fn embed_openai(
    model: &str,
    api_key: &str,
    timeout: Duration,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let response = client
        .post("https://api.openai.com/v1/embeddings")
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("OpenAI API error {}: {}", status, body_text);
    }

    let json: serde_json::Value = response.json().await?;
    parse_openai_embeddings(&json)
}

/// Extract the `data[].embedding` arrays from an OpenAI response.
fn parse_openai_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

async fn embed_ollama(
    model: &str,
    base_url: &str,
    timeout: Duration,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let response = client
        .post(format!("{}/api/embed", base_url))
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("Ollama API error {}: {}", status, body_text);
    }

    let json: serde_json::Value = response.json().await?;
    let data = json
        .get("embeddings")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

/// A provider wrapped with the content-addressed cache.
pub struct CachedEmbedder {
    provider: EmbeddingProvider,
    cache: EmbeddingCache,
    batch_size: usize,
}

impl CachedEmbedder {
    pub fn new(provider: EmbeddingProvider, cache: EmbeddingCache, batch_size: usize) -> Self {
        Self {
            provider,
            cache,
            batch_size,
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embed a batch, computing only texts missing from the cache.
    ///
    /// Misses go to the provider in slices of `batch_size`. Cached and
    /// freshly computed vectors are merged back into input order; fresh
    /// vectors are persisted before returning.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses = Vec::new();
        let mut miss_indices = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match self.cache.get(text) {
                Some(vector) => results[i] = Some(vector),
                None => {
                    misses.push(text.clone());
                    miss_indices.push(i);
                }
            }
        }

        if !misses.is_empty() {
            let mut fresh = Vec::with_capacity(misses.len());
            for batch in misses.chunks(self.batch_size) {
                fresh.extend(self.provider.embed_batch(batch).await?);
            }
            for (i, vector) in miss_indices.into_iter().zip(fresh.into_iter()) {
                if let Err(e) = self.cache.set(&texts[i], &vector) {
                    tracing::warn!("failed to persist embedding cache entry: {}", e);
                }
                results[i] = Some(vector);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Embed a single query text, cache-aware.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.cache.get(text) {
            return Ok(vector);
        }
        let vectors = self.provider.embed_batch(&[text.to_string()]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;
        if let Err(e) = self.cache.set(text, &vector) {
            tracing::warn!("failed to persist embedding cache entry: {}", e);
        }
        Ok(vector)
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn parse_openai_embeddings_shape() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2] },
                { "embedding": [0.3, 0.4] },
            ]
        });
        let vectors = parse_openai_embeddings(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.3f32, 0.4]);

        assert!(parse_openai_embeddings(&serde_json::json!({})).is_err());
    }

    /// All-cached batches must not touch the provider at all.
    #[tokio::test]
    async fn fully_cached_batch_skips_provider() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::new(tmp.path()).unwrap();
        cache.set("first", &[1.0, 0.0]).unwrap();
        cache.set("second", &[0.0, 1.0]).unwrap();

        // Unreachable endpoint: any network call would error.
        let provider = EmbeddingProvider::Ollama {
            model: "test".to_string(),
            dims: 2,
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(1),
        };
        let embedder = CachedEmbedder::new(provider, cache, 16);

        let vectors = embedder
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

        let single = embedder.embed_query("first").await.unwrap();
        assert_eq!(single, vec![1.0, 0.0]);
    }
}
