// src/provider/mod.rs — LLM collaborator layer

pub mod anthropic;
pub mod ollama;
pub mod openai_compat;
pub mod rate_limit;
pub mod registry;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::BrainstormError;

/// The one call the brainstorm core needs from an LLM backend:
/// send a prompt with overrides, get text back or an error.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn send(&self, prompt: &str, overrides: &SendOverrides)
        -> Result<String, BrainstormError>;
}

/// Per-request routing and sampling overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendOverrides {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl SendOverrides {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Reference to a specific model on a specific provider.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parse "provider/model" format. Only the first slash splits, so
    /// OpenRouter ids like `OpenRouter/mistralai/mistral-7b` stay intact.
    pub fn parse(s: &str) -> Option<Self> {
        let (provider, model) = s.split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(provider, model))
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Map an HTTP failure status to a provider error. 429 and 5xx are
/// flagged retriable; the status is always part of the message.
pub(crate) fn http_status_error(
    provider: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> BrainstormError {
    BrainstormError::Provider {
        provider: provider.to_string(),
        message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
        retriable: status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
    }
}

/// Map a transport-level reqwest failure to a provider error. Only timeouts
/// are retried; an unreachable host fails the run straight away.
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> BrainstormError {
    BrainstormError::Provider {
        provider: provider.to_string(),
        retriable: e.is_timeout(),
        message: e.to_string(),
    }
}
