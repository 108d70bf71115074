//! Chatwoot platform client — direct HTTP API, no SDK.
//!
//! Talks to the Chatwoot account-scoped REST API with the
//! `api_access_token` header. Three calls matter to the dispatcher:
//! visible messages, private notes, and operator assignment.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use towline_core::config::ChatwootConfig;
use towline_core::error::{Result, TowlineError};
use towline_core::platform::Platform;

/// Chatwoot REST client.
pub struct ChatwootClient {
    client: Client,
    base_url: String,
    account_id: String,
    api_token: String,
    operator_assignee_id: Option<i64>,
}

impl ChatwootClient {
    pub fn new(config: &ChatwootConfig, operator_assignee_id: Option<i64>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: config.url.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            api_token: config.api_token.clone(),
            operator_assignee_id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/accounts/{}{}", self.base_url, self.account_id, path)
    }

    async fn post(&self, url: &str, body: serde_json::Value) -> Result<()> {
        let resp = self
            .client
            .post(url)
            .header("api_access_token", &self.api_token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let detail: String = text.chars().take(200).collect();
            return Err(TowlineError::Platform(format!(
                "Chatwoot API error ({}): {}",
                status, detail
            )));
        }
        debug!("POST {} → {}", url, status);
        Ok(())
    }
}

#[async_trait]
impl Platform for ChatwootClient {
    async fn send_message(&self, conversation_id: i64, content: &str) -> Result<()> {
        let url = self.url(&format!("/conversations/{}/messages", conversation_id));
        self.post(&url, json!({ "content": content })).await
    }

    async fn add_private_note(&self, conversation_id: i64, content: &str) -> Result<()> {
        let url = self.url(&format!("/conversations/{}/messages", conversation_id));
        // Notes are best-effort observability; never fail the turn on them.
        if let Err(e) = self.post(&url, json!({ "content": content, "private": true })).await {
            warn!("Private note failed for conversation {}: {}", conversation_id, e);
        }
        Ok(())
    }

    async fn assign_operator(&self, conversation_id: i64) -> Result<()> {
        let Some(assignee_id) = self.operator_assignee_id else {
            return Ok(());
        };
        let url = self.url(&format!("/conversations/{}/assignments", conversation_id));
        self.post(&url, json!({ "assignee_id": assignee_id })).await
    }
}
