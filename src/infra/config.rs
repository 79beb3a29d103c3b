// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub judge: JudgeConfig,

    /// Per-provider overrides of the built-in rate-limit table.
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitConfig>,

    /// HTTP client settings, keyed by provider name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on concurrently dispatched run tasks.
    pub worker_limit: usize,
    /// Per-call timeout at the collaborator boundary (0 = none).
    pub request_timeout_secs: u64,
    /// Reject unknown providers that carry no explicit limiter override.
    pub strict_providers: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_limit: 10,
            request_timeout_secs: 120,
            strict_providers: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub base_delay_secs: f64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            prompt: None,
            max_retries: 3,
            backoff_factor: 2.0,
            base_delay_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub min_delay: Option<f64>,
    pub max_concurrent: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any `/chat/completions` endpoint.
    Openai,
    Anthropic,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub kind: ProviderKind,
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.orchestrator.worker_limit == 0 {
            anyhow::bail!("orchestrator.worker_limit must be at least 1");
        }
        if !(self.judge.backoff_factor >= 1.0) {
            anyhow::bail!("judge.backoff_factor must be >= 1.0");
        }
        if !(self.judge.base_delay_secs >= 0.0) || !self.judge.base_delay_secs.is_finite() {
            anyhow::bail!("judge.base_delay_secs must be a non-negative number");
        }
        for (name, rl) in &self.rate_limits {
            if rl.max_concurrent == Some(0) {
                anyhow::bail!("rate_limits.{name}.max_concurrent must be at least 1");
            }
            if let Some(d) = rl.min_delay {
                if !(d >= 0.0) || !d.is_finite() {
                    anyhow::bail!("rate_limits.{name}.min_delay must be a non-negative number");
                }
            }
        }
        Ok(())
    }
}
