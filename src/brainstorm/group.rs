// src/brainstorm/group.rs — Run group configuration and per-run results

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infra::errors::BrainstormError;
use crate::provider::retry::RetryPolicy;
use crate::provider::SendOverrides;

/// One batch of identical requests to a single provider/model.
///
/// Every run derived from a group behaves identically; runs of groups
/// naming the same provider share that provider's rate limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunGroup {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_runs")]
    pub runs: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Seconds between request starts to this provider. `None` uses the
    /// provider's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
    /// Retry attempts after the first one.
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
}

fn default_runs() -> u32 {
    1
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl RunGroup {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            runs: default_runs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            delay: None,
            retries: default_retries(),
            backoff_factor: default_backoff_factor(),
            max_concurrent: None,
        }
    }

    pub fn with_runs(mut self, runs: u32) -> Self {
        self.runs = runs;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.delay = Some(seconds);
        self
    }

    pub fn with_retries(mut self, retries: u32, backoff_factor: f64) -> Self {
        self.retries = retries;
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = Some(max_concurrent);
        self
    }

    /// Explicit delay, if this group sets one.
    pub fn delay_override(&self) -> Option<Duration> {
        self.delay
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Backoff schedule for this group's runs. `base_delay` is the request
    /// spacing the provider's limiter resolved (group value, config override
    /// or table default).
    pub fn retry_policy(&self, base_delay: Duration) -> RetryPolicy {
        RetryPolicy::new(self.retries, base_delay, self.backoff_factor)
    }

    pub fn overrides(&self) -> SendOverrides {
        SendOverrides::new(&self.provider, &self.model)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    /// Check the group's invariants. `index` is its position in the run list.
    pub fn validate(&self, index: usize) -> Result<(), BrainstormError> {
        let invalid = |reason: &str| BrainstormError::InvalidRunGroup {
            index,
            reason: reason.to_string(),
        };

        if self.provider.trim().is_empty() {
            return Err(invalid("provider is empty"));
        }
        if self.model.trim().is_empty() {
            return Err(invalid("model is empty"));
        }
        if self.runs == 0 {
            return Err(invalid("runs must be at least 1"));
        }
        if let Some(d) = self.delay {
            if !d.is_finite() || d < 0.0 {
                return Err(invalid("delay must be a non-negative number of seconds"));
            }
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(invalid("backoff_factor must be >= 1.0"));
        }
        if self.max_concurrent == Some(0) {
            return Err(invalid("max_concurrent must be at least 1"));
        }
        if !self.temperature.is_finite() {
            return Err(invalid("temperature must be a number"));
        }
        Ok(())
    }

    /// Short label for status lines.
    pub fn label(&self) -> String {
        format!("{} - {}", self.provider, self.model)
    }
}

/// A response from one successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub provider: String,
    pub model: String,
    pub response: String,
}

/// Total number of runs across all groups.
pub fn total_runs(groups: &[RunGroup]) -> usize {
    groups.iter().map(|g| g.runs as usize).sum()
}
