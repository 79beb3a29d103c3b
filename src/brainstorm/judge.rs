// src/brainstorm/judge.rs — Secondary evaluation pass over brainstorm results

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::group::RunResult;
use crate::infra::config::JudgeConfig;
use crate::infra::errors::BrainstormError;
use crate::provider::retry::{retry_with_backoff, RetryPolicy};
use crate::provider::{LlmClient, SendOverrides};

/// Marker prefixed to every failed evaluation.
pub const EVALUATION_ERROR_PREFIX: &str = "Error during evaluation: ";

/// Used when the judge prompt is blank.
pub const FALLBACK_JUDGE_PROMPT: &str = "Please rank and evaluate the following responses:";

/// Instruction shipped with the built-in presets.
pub const DEFAULT_JUDGE_PROMPT: &str = "Rank and evaluate the following responses. \
Provide a brief explanation for your ranking and highlight the strengths and \
weaknesses of each response.";

/// Which model judges, and with what instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeSettings {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl JudgeSettings {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// The instruction to send, falling back to the default one.
    pub fn prompt_text(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_JUDGE_PROMPT)
    }
}

/// Sends all responses to one model in a single request and returns its
/// verdict. Never fails: errors come back as text marked with
/// [`EVALUATION_ERROR_PREFIX`].
pub struct Judge {
    client: Arc<dyn LlmClient>,
    policy: RetryPolicy,
}

impl Judge {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            policy: RetryPolicy::judge_default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Judge whose retry schedule comes from the `[judge]` config section.
    pub fn from_config(client: Arc<dyn LlmClient>, config: &JudgeConfig) -> Self {
        let base_delay = if config.base_delay_secs.is_finite() && config.base_delay_secs >= 0.0 {
            Duration::from_secs_f64(config.base_delay_secs)
        } else {
            RetryPolicy::judge_default().base_delay
        };
        Self::new(client).with_policy(RetryPolicy::new(
            config.max_retries,
            base_delay,
            config.backoff_factor,
        ))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn evaluate(
        &self,
        results: &[RunResult],
        provider: &str,
        model: &str,
        judge_prompt: &str,
    ) -> String {
        if results.is_empty() {
            return format!("{EVALUATION_ERROR_PREFIX}no responses to evaluate");
        }

        let prompt = format_judge_prompt(results, judge_prompt);
        let overrides = SendOverrides::new(provider, model);
        tracing::info!(provider, model, responses = results.len(), "Evaluating responses");

        let outcome = retry_with_backoff(
            &self.policy,
            None,
            BrainstormError::is_transient,
            |event| {
                tracing::debug!(
                    retry = event.retry,
                    delay_ms = event.delay.as_millis() as u64,
                    "Judge call failed, backing off"
                );
            },
            |_| self.client.send(&prompt, &overrides),
        )
        .await;

        match outcome {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(provider, model, "Evaluation failed: {e}");
                format!("{EVALUATION_ERROR_PREFIX}{e}")
            }
        }
    }
}

/// Build the judge request: the instruction, then every response wrapped in
/// numbered tags.
pub fn format_judge_prompt(results: &[RunResult], judge_prompt: &str) -> String {
    let instruction = if judge_prompt.trim().is_empty() {
        FALLBACK_JUDGE_PROMPT
    } else {
        judge_prompt
    };

    let mut out = String::with_capacity(
        instruction.len() + results.iter().map(|r| r.response.len() + 40).sum::<usize>(),
    );
    out.push_str(instruction);
    out.push_str("\n\n");
    for (i, result) in results.iter().enumerate() {
        let n = i + 1;
        let _ = write!(out, "<response {n}>\n{}\n</response {n}>\n\n", result.response);
    }
    out
}

pub fn is_evaluation_error(text: &str) -> bool {
    text.starts_with(EVALUATION_ERROR_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(text: &str) -> RunResult {
        RunResult {
            provider: "OpenAI".into(),
            model: "gpt-4".into(),
            response: text.into(),
        }
    }

    #[test]
    fn test_format_wraps_responses_in_order() {
        let prompt = format_judge_prompt(&[result("alpha"), result("beta")], "Rank these.");
        assert_eq!(
            prompt,
            "Rank these.\n\n<response 1>\nalpha\n</response 1>\n\n<response 2>\nbeta\n</response 2>\n\n"
        );
    }

    #[test]
    fn test_blank_prompt_uses_fallback() {
        let prompt = format_judge_prompt(&[result("x")], "  ");
        assert!(prompt.starts_with(FALLBACK_JUDGE_PROMPT));
    }

    #[test]
    fn test_error_marker() {
        assert!(is_evaluation_error("Error during evaluation: HTTP 401"));
        assert!(!is_evaluation_error("Response 2 is best."));
    }

    #[test]
    fn test_settings_prompt_text_default() {
        let s = JudgeSettings::new("OpenAI", "gpt-4");
        assert_eq!(s.prompt_text(), DEFAULT_JUDGE_PROMPT);
        let s = s.with_prompt("Pick one.");
        assert_eq!(s.prompt_text(), "Pick one.");
    }

    #[test]
    fn test_from_config_policy() {
        struct Never;
        #[async_trait::async_trait]
        impl LlmClient for Never {
            async fn send(&self, _: &str, _: &SendOverrides) -> Result<String, BrainstormError> {
                unreachable!()
            }
        }

        let config = JudgeConfig {
            max_retries: 1,
            backoff_factor: 3.0,
            base_delay_secs: 0.5,
            ..Default::default()
        };
        let judge = Judge::from_config(Arc::new(Never), &config);
        assert_eq!(judge.policy().max_retries, 1);
        assert_eq!(judge.policy().base_delay, Duration::from_millis(500));
        assert_eq!(judge.policy().backoff_factor, 3.0);
    }
}
