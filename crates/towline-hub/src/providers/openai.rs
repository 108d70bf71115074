//! OpenAI-compatible completion backend.
//!
//! Works with any API that follows the OpenAI chat completions format:
//! OpenAI itself, OpenRouter, Groq, or a local Ollama/LM Studio endpoint
//! via `api_base`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use towline_core::error::{Result, TowlineError};
use towline_core::provider::{BackendConfig, ChatRequest, CompletionBackend};

/// OpenAI-compatible backend.
pub struct OpenAiBackend {
    client: Client,
    config: BackendConfig,
    api_url: String,
}

impl OpenAiBackend {
    pub fn new(config: BackendConfig) -> Self {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let api_url = format!("{}/chat/completions", api_base.trim_end_matches('/'));

        Self {
            client: Client::new(),
            config,
            api_url,
        }
    }

    /// Create a backend for OpenAI with an explicit key and model.
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self::new(BackendConfig {
            provider: "openai".to_string(),
            model: model.to_string(),
            api_key: Some(api_key.to_string()),
            api_base: None,
        })
    }
}

/// Internal request body.
#[derive(Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Value>,
    max_tokens: u32,
    temperature: f32,
}

/// Internal response body.
#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.config.provider
    }

    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let model = request.model.unwrap_or_else(|| self.config.model.clone());

        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| serde_json::to_value(m).unwrap_or_default())
            .collect();

        let body = ApiRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let api_key = self.config.api_key.as_deref().unwrap_or("");

        let resp = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| TowlineError::CompletionUpstream(format!("request failed: {}", e)))?;

        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .map_err(|e| TowlineError::CompletionUpstream(format!("read failed: {}", e)))?;

        debug!("API response status: {}, body length: {}", status, body_text.len());

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiError>(&body_text) {
                return Err(TowlineError::CompletionUpstream(format!(
                    "{} API error ({}): {}",
                    self.config.provider, status, err.error.message
                )));
            }
            let detail: String = body_text.chars().take(200).collect();
            return Err(TowlineError::CompletionUpstream(format!(
                "{} API error ({}): {}",
                self.config.provider, status, detail
            )));
        }

        let api_resp: ApiResponse = serde_json::from_str(&body_text).map_err(|e| {
            TowlineError::CompletionUpstream(format!("Failed to parse response: {}", e))
        })?;

        let choice = api_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TowlineError::CompletionUpstream("No choices in response".to_string()))?;

        choice
            .message
            .content
            .ok_or_else(|| TowlineError::CompletionUpstream("Empty completion".to_string()))
    }
}
