// src/brainstorm/orchestrator.rs — Concurrent fan-out of run groups

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::group::{total_runs, RunGroup, RunResult};
use super::progress::{ErrorFn, ProgressFn, ProgressReporter, ProgressUpdate};
use crate::infra::config::{OrchestratorConfig, RateLimitConfig};
use crate::infra::errors::BrainstormError;
use crate::provider::rate_limit::{LimiterSet, ProviderLimits, RateLimiter};
use crate::provider::retry::retry_with_backoff;
use crate::provider::{LlmClient, SendOverrides};

/// What a finished (or cancelled) run hands back to the caller.
#[derive(Debug, Clone, Default)]
pub struct BrainstormOutcome {
    /// Successful responses in completion order.
    pub results: Vec<RunResult>,
    /// Runs scheduled (Σ group.runs).
    pub total: usize,
    /// Runs abandoned after a non-transient error or an exhausted budget.
    pub failed: usize,
    /// Runs skipped or cut short by cancellation.
    pub skipped: usize,
    /// Backoff sleeps taken across all runs.
    pub retries: usize,
    pub cancelled: bool,
}

/// Cloneable handle that requests cooperative cancellation of a run.
#[derive(Debug, Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    /// Idempotent; safe to call from any thread.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Drives one brainstorm: every run of every group, concurrently, under
/// per-provider rate limits.
///
/// Individual run failures never fail the whole brainstorm; they are
/// reported through the error observer and left out of the results.
pub struct Orchestrator {
    client: Arc<dyn LlmClient>,
    config: OrchestratorConfig,
    rate_limits: HashMap<String, RateLimitConfig>,
    cancel: CancellationToken,
    on_progress: Option<ProgressFn>,
    on_error: Option<ErrorFn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Succeeded,
    Failed,
    Skipped,
}

/// State shared by every run task of one brainstorm.
struct RunShared {
    client: Arc<dyn LlmClient>,
    prompt: Arc<str>,
    reporter: ProgressReporter,
    on_error: Option<ErrorFn>,
    cancel: CancellationToken,
    pool: Arc<Semaphore>,
    request_timeout: Option<Duration>,
    results: Mutex<Vec<RunResult>>,
    retries: AtomicUsize,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            config: OrchestratorConfig::default(),
            rate_limits: HashMap::new(),
            cancel: CancellationToken::new(),
            on_progress: None,
            on_error: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides of the built-in provider rate-limit table.
    pub fn with_rate_limits(mut self, overrides: HashMap<String, RateLimitConfig>) -> Self {
        self.rate_limits = overrides;
        self
    }

    /// Set a callback for progress updates.
    pub fn with_progress(mut self, cb: impl Fn(ProgressUpdate) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(cb));
        self
    }

    /// Set a callback for abandoned runs.
    pub fn with_errors(mut self, cb: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(cb));
        self
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Check the inputs and build one limiter per provider.
    fn prepare(&self, prompt: &str, groups: &[RunGroup]) -> Result<LimiterSet, BrainstormError> {
        if prompt.trim().is_empty() {
            return Err(BrainstormError::EmptyPrompt);
        }

        let mut limiters = LimiterSet::new(self.rate_limits.clone());
        for (index, group) in groups.iter().enumerate() {
            group.validate(index)?;

            let explicit = group.delay.is_some() || group.max_concurrent.is_some();
            if !limiters.has_defaults_for(&group.provider) {
                if self.config.strict_providers && !explicit {
                    return Err(BrainstormError::UnknownProvider {
                        provider: group.provider.clone(),
                    });
                }
                tracing::debug!(
                    provider = %group.provider,
                    fallback = ?ProviderLimits::for_provider(&group.provider),
                    "Unknown provider, using generic rate limits"
                );
            }
            limiters.request(&group.provider, group.delay_override(), group.max_concurrent);
        }
        Ok(limiters.build())
    }

    /// Run every group's runs and collect the successful responses.
    ///
    /// An empty group list only reports final progress. Invalid groups or
    /// an empty prompt fail before anything is sent.
    pub async fn run(
        &self,
        prompt: &str,
        groups: &[RunGroup],
    ) -> Result<BrainstormOutcome, BrainstormError> {
        if groups.is_empty() {
            tracing::debug!("No run groups given, nothing to do");
            ProgressReporter::new(0, self.on_progress.clone()).finish("Finished all runs.");
            return Ok(BrainstormOutcome::default());
        }

        let limiters = self.prepare(prompt, groups)?;
        let total = total_runs(groups);
        let workers = self.config.worker_limit.clamp(1, total.max(1));

        tracing::info!(
            groups = groups.len(),
            total,
            providers = limiters.len(),
            workers,
            "Starting brainstorm"
        );

        let shared = Arc::new(RunShared {
            client: self.client.clone(),
            prompt: Arc::from(prompt),
            reporter: ProgressReporter::new(total, self.on_progress.clone()),
            on_error: self.on_error.clone(),
            cancel: self.cancel.clone(),
            pool: Arc::new(Semaphore::new(workers)),
            request_timeout: self.config.request_timeout(),
            results: Mutex::new(Vec::with_capacity(total)),
            retries: AtomicUsize::new(0),
        });

        let mut tasks = JoinSet::new();
        for group in groups {
            let group = Arc::new(group.clone());
            let Some(limiter) = limiters.get(&group.provider) else {
                continue;
            };
            for run_idx in 0..group.runs {
                tasks.spawn(run_task(
                    shared.clone(),
                    group.clone(),
                    limiter.clone(),
                    run_idx,
                ));
            }
        }

        let mut outcome = BrainstormOutcome {
            total,
            ..Default::default()
        };
        let mut cancel_seen = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    tracing::info!("Cancellation requested, draining outstanding runs");
                    // Wake everything still queued for a worker or a provider slot.
                    shared.pool.close();
                    limiters.close_all();
                }
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok(TaskOutcome::Succeeded) => {}
                        Ok(TaskOutcome::Failed) => outcome.failed += 1,
                        Ok(TaskOutcome::Skipped) => outcome.skipped += 1,
                        Err(e) => {
                            outcome.failed += 1;
                            let message = format!("Run task aborted: {e}");
                            tracing::error!("{message}");
                            shared.notify_error(message.clone());
                            shared.reporter.complete_one(message);
                        }
                    }
                }
            }
        }

        outcome.cancelled = self.cancel.is_cancelled();
        outcome.retries = shared.retries.load(Ordering::SeqCst);
        outcome.results = std::mem::take(&mut *lock_results(&shared.results));

        let summary = if outcome.cancelled {
            format!(
                "Cancelled. Kept {} of {} result(s).",
                outcome.results.len(),
                total
            )
        } else {
            "Finished all runs.".to_string()
        };
        shared.reporter.finish(summary);

        tracing::info!(
            succeeded = outcome.results.len(),
            failed = outcome.failed,
            skipped = outcome.skipped,
            retries = outcome.retries,
            cancelled = outcome.cancelled,
            "Brainstorm finished"
        );

        Ok(outcome)
    }
}

impl RunShared {
    fn notify_error(&self, message: String) {
        if let Some(ref cb) = self.on_error {
            cb(message);
        }
    }
}

/// One run: wait for a worker, then attempt with retry under the
/// provider's limiter.
async fn run_task(
    shared: Arc<RunShared>,
    group: Arc<RunGroup>,
    limiter: Arc<RateLimiter>,
    run_idx: u32,
) -> TaskOutcome {
    let run_no = run_idx + 1;
    let label = group.label();

    let _worker = match shared.pool.clone().acquire_owned().await {
        Ok(permit) if !shared.cancel.is_cancelled() => permit,
        _ => {
            shared
                .reporter
                .complete_one(format!("Skipped run {run_no}/{} for {label}", group.runs));
            return TaskOutcome::Skipped;
        }
    };

    shared
        .reporter
        .status(format!("Starting run {run_no}/{} for {label}", group.runs));
    tracing::debug!(provider = %group.provider, model = %group.model, run = run_no, "Run started");

    let policy = group.retry_policy(limiter.min_delay());
    let overrides = group.overrides();
    let shared_ref = &shared;
    let limiter_ref = &limiter;
    let overrides_ref = &overrides;

    let result = retry_with_backoff(
        &policy,
        Some(&shared.cancel),
        BrainstormError::is_transient,
        |event| {
            shared_ref.retries.fetch_add(1, Ordering::SeqCst);
            shared_ref.reporter.status(format!(
                "Rate limited. Retrying run {run_no} for {label} in {:.1} seconds...",
                event.delay.as_secs_f64()
            ));
        },
        |_attempt| async move {
            let _permit = tokio::select! {
                biased;
                _ = shared_ref.cancel.cancelled() => return Err(BrainstormError::Cancelled),
                permit = limiter_ref.acquire() => permit?,
            };
            send_with_timeout(
                shared_ref.client.as_ref(),
                &shared_ref.prompt,
                overrides_ref,
                shared_ref.request_timeout,
            )
            .await
        },
    )
    .await;

    match result {
        Ok(response) => {
            lock_results(&shared.results).push(RunResult {
                provider: group.provider.clone(),
                model: group.model.clone(),
                response,
            });
            shared
                .reporter
                .complete_one(format!("Completed run {run_no}/{} for {label}", group.runs));
            TaskOutcome::Succeeded
        }
        Err(BrainstormError::Cancelled) => {
            shared
                .reporter
                .complete_one(format!("Cancelled run {run_no}/{} for {label}", group.runs));
            TaskOutcome::Skipped
        }
        Err(e) => {
            let message = format!("Error during run {run_no} for {label}: {e}");
            tracing::warn!("{message}");
            shared.notify_error(message);
            shared
                .reporter
                .complete_one(format!("Run {run_no}/{} for {label} failed", group.runs));
            TaskOutcome::Failed
        }
    }
}

/// A task that panicked while holding the lock leaves the collected
/// results intact, so keep using them.
fn lock_results(results: &Mutex<Vec<RunResult>>) -> MutexGuard<'_, Vec<RunResult>> {
    results.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Call the collaborator, bounded by the per-call timeout when one is set.
async fn send_with_timeout(
    client: &dyn LlmClient,
    prompt: &str,
    overrides: &SendOverrides,
    timeout: Option<Duration>,
) -> Result<String, BrainstormError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, client.send(prompt, overrides))
            .await
            .map_err(|_| BrainstormError::Timeout {
                provider: overrides.provider.clone(),
                secs: limit.as_secs(),
            })?,
        None => client.send(prompt, overrides).await,
    }
}
