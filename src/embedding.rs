//! Embedding provider abstraction.
//!
//! Defines the [`Embedder`] capability trait and the
//! [`OpenAiCompatibleEmbedder`] implementation, which talks to any
//! OpenAI-compatible `/embeddings` endpoint (hosted or self-hosted,
//! selected by configuration).
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`normalized_similarity`] — map cosine into the `[0, 1]` range used
//!   by retrieval scoring
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 encoding for
//!   SQLite BLOB storage
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, ... (exponent capped at 2^5), bounded by
//!   `embedding.max_retries`

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{DeskError, Result};

/// Capability interface for embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embedding provider for OpenAI-compatible `/embeddings` endpoints.
///
/// The `self-hosted` provider variant uses the same wire protocol with a
/// different base URL and no API key requirement.
pub struct OpenAiCompatibleEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    api_key: Option<String>,
    max_retries: u32,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match config.provider.as_str() {
            "self-hosted" => std::env::var(&config.api_key_env).ok(),
            _ => Some(std::env::var(&config.api_key_env).map_err(|_| {
                DeskError::EmbeddingProvider(format!(
                    "{} environment variable not set",
                    config.api_key_env
                ))
            })?),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DeskError::EmbeddingProvider(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&url).json(&body);
            if let Some(ref key) = self.api_key {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| DeskError::EmbeddingProvider(e.to_string()))?;
                        return parse_embeddings_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, attempt, "embedding request failed, will retry");
                        last_err = Some(DeskError::EmbeddingProvider(format!(
                            "embedding API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    return Err(DeskError::EmbeddingProvider(format!(
                        "embedding API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "embedding request error, will retry");
                    last_err = Some(DeskError::EmbeddingProvider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            DeskError::EmbeddingProvider("embedding failed after retries".to_string())
        }))
    }
}

fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        DeskError::EmbeddingProvider("invalid embeddings response: missing data array".to_string())
    })?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                DeskError::EmbeddingProvider(
                    "invalid embeddings response: missing embedding".to_string(),
                )
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Construct the configured [`Embedder`].
pub fn create_embedder(config: &EmbeddingConfig) -> Result<std::sync::Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" | "self-hosted" => Ok(std::sync::Arc::new(OpenAiCompatibleEmbedder::new(config)?)),
        other => Err(DeskError::Validation(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
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

/// Cosine similarity in `[-1, 1]`. Returns `0.0` for empty or
/// mismatched-length vectors.
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

/// Map cosine similarity into `[0, 1]` (higher = more similar).
///
/// The fixed affine map keeps scores comparable across queries, which
/// confidence labeling depends on. Per-result-set min-max normalization
/// would not.
pub fn normalized_similarity(cosine: f32) -> f64 {
    (((cosine + 1.0) / 2.0) as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_normalized_range() {
        assert!((normalized_similarity(1.0) - 1.0).abs() < 1e-9);
        assert!((normalized_similarity(-1.0)).abs() < 1e-9);
        assert!((normalized_similarity(0.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_normalized_monotonic() {
        assert!(normalized_similarity(0.9) > normalized_similarity(0.5));
        assert!(normalized_similarity(0.5) > normalized_similarity(-0.2));
    }

    #[test]
    fn test_parse_embeddings_response() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2] },
                { "embedding": [0.3, 0.4] }
            ]
        });
        let parsed = parse_embeddings_response(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].len(), 2);
    }

    #[test]
    fn test_parse_embeddings_response_missing_data() {
        let json = serde_json::json!({ "unexpected": true });
        assert!(parse_embeddings_response(&json).is_err());
    }
}
