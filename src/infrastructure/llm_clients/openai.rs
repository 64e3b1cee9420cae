use std::time::Duration;

use super::LLMClient;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, warn};

/// Client for the OpenAI chat-completions protocol.
pub struct OpenAIClient {
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn completions_url(config: &LLMConfig) -> String {
        if config.base_url.ends_with('/') {
            format!("{}chat/completions", config.base_url)
        } else {
            format!("{}/chat/completions", config.base_url)
        }
    }

    fn request_body(config: &LLMConfig, system: &str, user: &str) -> serde_json::Value {
        json!({
            "model": config.model,
            "messages": [
                {
                    "role": "system",
                    "content": system
                },
                {
                    "role": "user",
                    "content": user
                }
            ],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
        })
    }

    fn extract_content(json: &serde_json::Value) -> Result<String> {
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::LLMError("Invalid response format".to_string()))
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        let api_key = config.credential().ok_or(AppError::ApiCredentialMissing)?;
        let url = Self::completions_url(config);

        debug!(model = %config.model, "Sending chat completion request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&Self::request_body(config, system, user))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::LLMError("Request timed out".to_string())
                } else {
                    AppError::LLMError(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, "Chat completion request rejected upstream");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    AppError::LLMError(format!("Credential rejected ({})", status))
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    AppError::LLMError("Upstream quota exceeded".to_string())
                }
                _ => AppError::LLMError(format!("API error ({}): {}", status, text)),
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to parse JSON: {}", e)))?;

        Self::extract_content(&json)
    }
}
