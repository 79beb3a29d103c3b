// src/provider/anthropic.rs — Anthropic Messages API client

use async_trait::async_trait;

use super::{http_status_error, transport_error, LlmClient, SendOverrides};
use crate::infra::errors::BrainstormError;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
/// The Messages API requires max_tokens on every request.
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicClient {
    api_key: String,
    api_url: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self::with_url(api_key, API_URL)
    }

    pub fn with_url(api_key: String, api_url: impl Into<String>) -> Self {
        Self {
            api_key,
            api_url: api_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn build_body(prompt: &str, overrides: &SendOverrides) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": overrides.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": overrides.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if let Some(temp) = overrides.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

/// Concatenate the text blocks of a Messages API response.
fn extract_text(resp: &serde_json::Value) -> String {
    resp["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|c| c["type"] == "text")
                .filter_map(|c| c["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn send(
        &self,
        prompt: &str,
        overrides: &SendOverrides,
    ) -> Result<String, BrainstormError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&Self::build_body(prompt, overrides))
            .send()
            .await
            .map_err(|e| transport_error(&overrides.provider, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(http_status_error(&overrides.provider, status, &error_body));
        }

        let resp: serde_json::Value =
            response.json().await.map_err(|e| BrainstormError::Provider {
                provider: overrides.provider.clone(),
                message: format!("Failed to parse response: {e}"),
                retriable: false,
            })?;

        Ok(extract_text(&resp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_defaults_max_tokens() {
        let body = AnthropicClient::build_body("hi", &SendOverrides::new("Anthropic", "claude"));
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_body_forwards_overrides() {
        let o = SendOverrides::new("Anthropic", "claude-3-haiku-20240307")
            .with_max_tokens(512)
            .with_temperature(0.9);
        let body = AnthropicClient::build_body("hi", &o);
        assert_eq!(body["model"], "claude-3-haiku-20240307");
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn test_extract_text_joins_text_blocks() {
        let resp = serde_json::json!({
            "content": [
                {"type": "text", "text": "Once "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "upon a time"}
            ]
        });
        assert_eq!(extract_text(&resp), "Once upon a time");
        assert_eq!(extract_text(&serde_json::json!({})), "");
    }
}
