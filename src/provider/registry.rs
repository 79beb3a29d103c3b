// src/provider/registry.rs — Route requests to a client by provider name

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::anthropic::AnthropicClient;
use super::ollama::OllamaClient;
use super::openai_compat::OpenAICompatClient;
use super::{LlmClient, SendOverrides};
use crate::infra::config::{Config, ProviderEntry, ProviderKind};
use crate::infra::errors::BrainstormError;

/// Well-known providers: (name, kind, default base URL, API key env var).
const BUILTIN_PROVIDERS: &[(&str, ProviderKind, &str, Option<&str>)] = &[
    ("OpenAI", ProviderKind::Openai, "https://api.openai.com/v1", Some("OPENAI_API_KEY")),
    ("Anthropic", ProviderKind::Anthropic, "https://api.anthropic.com/v1/messages", Some("ANTHROPIC_API_KEY")),
    ("OpenRouter", ProviderKind::Openai, "https://openrouter.ai/api/v1", Some("OPENROUTER_API_KEY")),
    ("TogetherAI", ProviderKind::Openai, "https://api.together.xyz/v1", Some("TOGETHER_API_KEY")),
    ("Gemini", ProviderKind::Openai, "https://generativelanguage.googleapis.com/v1beta/openai", Some("GEMINI_API_KEY")),
    ("LMStudio", ProviderKind::Openai, "http://localhost:1234/v1", None),
    ("Ollama", ProviderKind::Ollama, super::ollama::DEFAULT_BASE_URL, None),
];

/// Dispatches each request to the client registered for
/// `overrides.provider` (case-insensitive).
#[derive(Default)]
pub struct ProviderRegistry {
    clients: HashMap<String, Arc<dyn LlmClient>>,
    /// Providers skipped for lack of credentials, with the env var to set.
    missing_keys: HashMap<String, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: &str, client: Arc<dyn LlmClient>) {
        let key = provider.to_lowercase();
        self.missing_keys.remove(&key);
        self.clients.insert(key, client);
    }

    pub fn with_client(mut self, provider: &str, client: Arc<dyn LlmClient>) -> Self {
        self.register(provider, client);
        self
    }

    pub fn is_registered(&self, provider: &str) -> bool {
        self.clients.contains_key(&provider.to_lowercase())
    }

    /// Registered provider names (lowercased), sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build clients for the well-known providers plus any `[providers.*]`
    /// entries. Credentials come from the environment via `env`.
    pub fn from_config_with_env(config: &Config, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut registry = Self::new();

        for &(name, kind, base_url, key_env) in BUILTIN_PROVIDERS {
            if config
                .providers
                .keys()
                .any(|k| k.eq_ignore_ascii_case(name))
            {
                continue;
            }
            let entry = ProviderEntry {
                kind,
                base_url: Some(base_url.to_string()),
                api_key_env: key_env.map(str::to_string),
            };
            registry.register_entry(name, &entry, &env);
        }

        for (name, entry) in &config.providers {
            registry.register_entry(name, entry, &env);
        }

        tracing::debug!(providers = ?registry.providers(), "Provider registry built");
        registry
    }

    pub fn from_config(config: &Config) -> Self {
        Self::from_config_with_env(config, |var| std::env::var(var).ok())
    }

    fn register_entry(
        &mut self,
        name: &str,
        entry: &ProviderEntry,
        env: &impl Fn(&str) -> Option<String>,
    ) {
        let api_key = entry
            .api_key_env
            .as_deref()
            .and_then(|var| env(var))
            .filter(|k| !k.is_empty());

        let client: Arc<dyn LlmClient> = match entry.kind {
            ProviderKind::Openai => {
                if entry.api_key_env.is_some() && api_key.is_none() {
                    self.note_missing_key(name, entry);
                    return;
                }
                let base_url = entry
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:8080/v1".into());
                Arc::new(OpenAICompatClient::new(name, api_key, base_url))
            }
            ProviderKind::Anthropic => {
                let Some(key) = api_key else {
                    self.note_missing_key(name, entry);
                    return;
                };
                match &entry.base_url {
                    Some(url) => Arc::new(AnthropicClient::with_url(key, url.clone())),
                    None => Arc::new(AnthropicClient::new(key)),
                }
            }
            ProviderKind::Ollama => Arc::new(OllamaClient::new(entry.base_url.clone())),
        };
        self.register(name, client);
    }

    fn note_missing_key(&mut self, name: &str, entry: &ProviderEntry) {
        let var = entry.api_key_env.clone().unwrap_or_default();
        tracing::debug!(provider = name, env = %var, "Skipping provider without API key");
        self.missing_keys.insert(name.to_lowercase(), var);
    }
}

#[async_trait]
impl LlmClient for ProviderRegistry {
    async fn send(
        &self,
        prompt: &str,
        overrides: &SendOverrides,
    ) -> Result<String, BrainstormError> {
        let key = overrides.provider.to_lowercase();
        match self.clients.get(&key) {
            Some(client) => client.send(prompt, overrides).await,
            None => {
                let message = match self.missing_keys.get(&key) {
                    Some(var) => format!("not configured (set {var})"),
                    None => "no client registered for this provider".to_string(),
                };
                Err(BrainstormError::Provider {
                    provider: overrides.provider.clone(),
                    message,
                    retriable: false,
                })
            }
        }
    }
}
