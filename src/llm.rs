//! Language model provider abstraction.
//!
//! Defines the [`Generator`] capability trait and the
//! [`OpenAiCompatibleGenerator`] implementation over the
//! `/chat/completions` wire protocol. Retry policy matches the
//! embedding client: 429/5xx and network errors retry with exponential
//! backoff, other client errors fail immediately.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{DeskError, Result};

/// Capability interface for text-generation backends.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;
    /// Generate a completion for the assembled prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Generator for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiCompatibleGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    api_key: Option<String>,
    max_retries: u32,
}

impl OpenAiCompatibleGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = match config.provider.as_str() {
            "self-hosted" => std::env::var(&config.api_key_env).ok(),
            _ => Some(std::env::var(&config.api_key_env).map_err(|_| {
                DeskError::LlmProvider(format!(
                    "{} environment variable not set",
                    config.api_key_env
                ))
            })?),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DeskError::LlmProvider(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "user", "content": prompt }
            ],
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
                            .map_err(|e| DeskError::LlmProvider(e.to_string()))?;
                        return parse_completion_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, attempt, "completion request failed, will retry");
                        last_err = Some(DeskError::LlmProvider(format!(
                            "completion API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    return Err(DeskError::LlmProvider(format!(
                        "completion API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "completion request error, will retry");
                    last_err = Some(DeskError::LlmProvider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            DeskError::LlmProvider("completion failed after retries".to_string())
        }))
    }
}

fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|t| t.trim().to_string())
        .ok_or_else(|| {
            DeskError::LlmProvider("invalid completion response: missing choices".to_string())
        })
}

/// Construct the configured [`Generator`].
pub fn create_generator(config: &LlmConfig) -> Result<std::sync::Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai" | "self-hosted" => {
            Ok(std::sync::Arc::new(OpenAiCompatibleGenerator::new(config)?))
        }
        other => Err(DeskError::Validation(format!(
            "unknown llm provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion_response() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "  The answer.  " } }
            ]
        });
        assert_eq!(parse_completion_response(&json).unwrap(), "The answer.");
    }

    #[test]
    fn test_parse_completion_response_empty_choices() {
        let json = serde_json::json!({ "choices": [] });
        assert!(parse_completion_response(&json).is_err());
    }
}
