// src/provider/ollama.rs — Ollama local inference client

use async_trait::async_trait;

use super::{http_status_error, transport_error, LlmClient, SendOverrides};
use crate::infra::errors::BrainstormError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn build_body(prompt: &str, overrides: &SendOverrides) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": overrides.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
        });

        let mut options = serde_json::Map::new();
        if let Some(temp) = overrides.temperature {
            options.insert("temperature".into(), serde_json::json!(temp));
        }
        if let Some(max_tokens) = overrides.max_tokens {
            options.insert("num_predict".into(), serde_json::json!(max_tokens));
        }
        if !options.is_empty() {
            body["options"] = serde_json::Value::Object(options);
        }
        body
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn send(
        &self,
        prompt: &str,
        overrides: &SendOverrides,
    ) -> Result<String, BrainstormError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
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

        Ok(resp["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_maps_max_tokens_to_num_predict() {
        let o = SendOverrides::new("Ollama", "llama2")
            .with_temperature(0.7)
            .with_max_tokens(1024);
        let body = OllamaClient::build_body("hi", &o);
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 1024);
        assert!(body["options"]["temperature"].is_number());
    }

    #[test]
    fn test_body_without_options() {
        let body = OllamaClient::build_body("hi", &SendOverrides::new("Ollama", "llama2"));
        assert!(body.get("options").is_none());
    }

    #[test]
    fn test_default_base_url() {
        assert_eq!(OllamaClient::default().base_url, DEFAULT_BASE_URL);
    }
}
