//! LLM completion capability with token accounting.

use crate::{Error, LlmConfig, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// One completion: the text plus what it cost in tokens.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The LLM capability consumed by the action proposer.
///
/// Implementations honor their own request timeout; callers treat any error
/// as a proposal failure and never retry transport errors themselves.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<CompletionResponse>;

    /// Multimodal path for vision-mode proposals.
    async fn complete_with_image(
        &self,
        system: &str,
        user: &str,
        image_png: &[u8],
    ) -> Result<CompletionResponse>;
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }

    async fn request(&self, system: &str, content: Value) -> Result<CompletionResponse> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": content }],
        });

        for attempt in 0..MAX_RATE_LIMIT_RETRIES {
            let resp = self
                .http
                .post(API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await?;

            let status = resp.status();
            let payload: Value = resp.json().await?;

            let rate_limited = status.as_u16() == 429
                || payload
                    .get("error")
                    .is_some_and(|e| e["type"] == "rate_limit_error");
            if rate_limited {
                let wait = (attempt + 1) as u64 * 5;
                warn!("rate limited, waiting {}s", wait);
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            if let Some(err) = payload.get("error") {
                return Err(Error::LlmApi {
                    status: status.as_u16(),
                    message: err["message"].as_str().unwrap_or("unknown error").to_string(),
                });
            }

            let text = payload["content"][0]["text"].as_str().unwrap_or("").to_string();
            return Ok(CompletionResponse {
                text,
                input_tokens: payload["usage"]["input_tokens"].as_u64().unwrap_or(0),
                output_tokens: payload["usage"]["output_tokens"].as_u64().unwrap_or(0),
            });
        }

        Err(Error::LlmApi {
            status: 429,
            message: format!("rate limited after {} retries", MAX_RATE_LIMIT_RETRIES),
        })
    }
}

#[async_trait]
impl Completion for AnthropicClient {
    async fn complete(&self, system: &str, user: &str) -> Result<CompletionResponse> {
        self.request(system, json!(user)).await
    }

    async fn complete_with_image(
        &self,
        system: &str,
        user: &str,
        image_png: &[u8],
    ) -> Result<CompletionResponse> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_png);
        let content = json!([
            {
                "type": "image",
                "source": { "type": "base64", "media_type": "image/png", "data": encoded }
            },
            { "type": "text", "text": user },
        ]);
        self.request(system, content).await
    }
}
