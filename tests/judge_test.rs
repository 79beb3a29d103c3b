// tests/judge_test.rs — Evaluation pass over brainstorm results

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use muse::brainstorm::judge::{is_evaluation_error, Judge, FALLBACK_JUDGE_PROMPT};
use muse::brainstorm::RunResult;
use muse::infra::errors::BrainstormError;
use muse::provider::retry::RetryPolicy;
use muse::provider::{LlmClient, SendOverrides};

/// Fails the first `failures` calls with `message`, then answers.
struct FlakyJudge {
    failures: usize,
    message: &'static str,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, SendOverrides)>>,
}

impl FlakyJudge {
    fn new(failures: usize, message: &'static str) -> Self {
        Self {
            failures,
            message,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FlakyJudge {
    async fn send(
        &self,
        prompt: &str,
        overrides: &SendOverrides,
    ) -> Result<String, BrainstormError> {
        self.seen
            .lock()
            .unwrap()
            .push((prompt.to_string(), overrides.clone()));
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(BrainstormError::Provider {
                provider: overrides.provider.clone(),
                message: self.message.to_string(),
                retriable: false,
            });
        }
        Ok("Response 2 is the strongest.".to_string())
    }
}

fn results() -> Vec<RunResult> {
    vec![
        RunResult {
            provider: "OpenAI".into(),
            model: "gpt-4".into(),
            response: "A bakery called Crumb".into(),
        },
        RunResult {
            provider: "Ollama".into(),
            model: "llama2".into(),
            response: "Rise & Shine".into(),
        },
    ]
}

#[tokio::test(start_paused = true)]
async fn test_evaluate_sends_single_formatted_request() {
    let client = Arc::new(FlakyJudge::new(0, ""));
    let judge = Judge::new(client.clone());

    let verdict = judge
        .evaluate(&results(), "OpenAI", "gpt-4", "Rank these names.")
        .await;

    assert_eq!(verdict, "Response 2 is the strongest.");
    assert_eq!(client.calls(), 1);

    let seen = client.seen.lock().unwrap();
    let (prompt, overrides) = &seen[0];
    assert_eq!(
        prompt,
        "Rank these names.\n\n\
         <response 1>\nA bakery called Crumb\n</response 1>\n\n\
         <response 2>\nRise & Shine\n</response 2>\n\n"
    );
    assert_eq!(overrides.provider, "OpenAI");
    assert_eq!(overrides.model, "gpt-4");
    assert_eq!(overrides.temperature, None);
    assert_eq!(overrides.max_tokens, None);
}

#[tokio::test(start_paused = true)]
async fn test_empty_judge_prompt_falls_back() {
    let client = Arc::new(FlakyJudge::new(0, ""));
    Judge::new(client.clone())
        .evaluate(&results(), "OpenAI", "gpt-4", "")
        .await;

    let seen = client.seen.lock().unwrap();
    assert!(seen[0].0.starts_with(FALLBACK_JUDGE_PROMPT));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let client = Arc::new(FlakyJudge::new(2, "HTTP 503: overloaded"));
    let start = tokio::time::Instant::now();

    let verdict = Judge::new(client.clone())
        .evaluate(&results(), "OpenAI", "gpt-4", "Rank.")
        .await;

    assert!(!is_evaluation_error(&verdict));
    assert_eq!(client.calls(), 3);
    // 1s then 2s of backoff
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_budget_returns_error_text() {
    let client = Arc::new(FlakyJudge::new(4, "HTTP 429: rate limited"));

    let verdict = Judge::new(client.clone())
        .evaluate(&results(), "OpenAI", "gpt-4", "Rank.")
        .await;

    assert!(is_evaluation_error(&verdict));
    assert!(verdict.contains("429"));
    // first attempt plus three retries
    assert_eq!(client.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_non_transient_failure_is_not_retried() {
    let client = Arc::new(FlakyJudge::new(1, "401 unauthorized"));

    let verdict = Judge::new(client.clone())
        .evaluate(&results(), "Anthropic", "claude", "Rank.")
        .await;

    assert!(verdict.starts_with("Error during evaluation: "));
    assert!(verdict.contains("401 unauthorized"));
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_empty_results_make_no_call() {
    let client = Arc::new(FlakyJudge::new(0, ""));

    let verdict = Judge::new(client.clone())
        .evaluate(&[], "OpenAI", "gpt-4", "Rank.")
        .await;

    assert!(is_evaluation_error(&verdict));
    assert_eq!(client.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_policy_limits_retries() {
    let client = Arc::new(FlakyJudge::new(5, "HTTP 500: boom"));
    let judge = Judge::new(client.clone())
        .with_policy(RetryPolicy::new(1, Duration::from_millis(10), 2.0));

    let verdict = judge.evaluate(&results(), "OpenAI", "gpt-4", "Rank.").await;

    assert!(is_evaluation_error(&verdict));
    assert_eq!(client.calls(), 2);
}
