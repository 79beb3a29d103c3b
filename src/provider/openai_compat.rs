// src/provider/openai_compat.rs — Generic OpenAI-compatible client
//
// Used by: OpenAI, OpenRouter, TogetherAI, LMStudio, Gemini (OpenAI
// compatibility endpoint) and custom endpoints.

use async_trait::async_trait;

use super::{http_status_error, transport_error, LlmClient, SendOverrides};
use crate::infra::errors::BrainstormError;

/// Client for any `/chat/completions` endpoint.
pub struct OpenAICompatClient {
    id_str: String,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAICompatClient {
    pub fn new(id: impl Into<String>, api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            id_str: id.into(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_body(prompt: &str, overrides: &SendOverrides) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": overrides.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(max_tokens) = overrides.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temp) = overrides.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

/// Pull the assistant text out of a chat completion response.
pub(crate) fn extract_content(resp: &serde_json::Value) -> Option<String> {
    resp["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl LlmClient for OpenAICompatClient {
    async fn send(
        &self,
        prompt: &str,
        overrides: &SendOverrides,
    ) -> Result<String, BrainstormError> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "User-Agent",
                format!("muse/{}", env!("CARGO_PKG_VERSION")),
            )
            .json(&Self::build_body(prompt, overrides));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&self.id_str, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(http_status_error(&self.id_str, status, &error_body));
        }

        let resp: serde_json::Value =
            response.json().await.map_err(|e| BrainstormError::Provider {
                provider: self.id_str.clone(),
                message: format!("Failed to parse response: {e}"),
                retriable: false,
            })?;

        extract_content(&resp).ok_or_else(|| BrainstormError::Provider {
            provider: self.id_str.clone(),
            message: "Response contained no message content".into(),
            retriable: false,
        })
    }
}
