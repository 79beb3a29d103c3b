// src/provider/retry.rs — Retry with exponential backoff and jitter
//
// One routine shared by brainstorm run tasks and the judge call.
// Retries only what the caller's predicate calls transient (by default:
// rate limits, 5xx, timeouts). Everything else fails on the first attempt.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::infra::errors::BrainstormError;

/// Judge defaults: 3 retries, 1s base delay, doubling.
const JUDGE_MAX_RETRIES: u32 = 3;
const JUDGE_BASE_DELAY: Duration = Duration::from_secs(1);
const JUDGE_BACKOFF_FACTOR: f64 = 2.0;

/// Jitter is drawn from [0, JITTER_FRACTION] of the base delay.
pub const JITTER_FRACTION: f64 = 0.1;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub jitter_fraction: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff_factor,
            jitter_fraction: JITTER_FRACTION,
        }
    }

    /// Fixed policy for the single judge request.
    pub fn judge_default() -> Self {
        Self::new(JUDGE_MAX_RETRIES, JUDGE_BASE_DELAY, JUDGE_BACKOFF_FACTOR)
    }

    /// Un-jittered delay before retry number `retry` (1-indexed):
    /// `base × factor^(retry-1)`.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        duration_from_secs(secs)
    }

    /// Delay before retry number `retry`, with jitter added on top.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_for(retry);
        let jitter = base.as_secs_f64() * self.jitter_fraction * jitter_unit(retry);
        base + duration_from_secs(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::judge_default()
    }
}

/// What a retry callback gets to see before the backoff sleep starts.
#[derive(Debug)]
pub struct RetryEvent<'a> {
    /// 1-indexed retry number about to be attempted after the sleep.
    pub retry: u32,
    pub max_retries: u32,
    pub delay: Duration,
    pub error: &'a BrainstormError,
}

/// Run `op` until it succeeds, fails non-transiently, or exhausts
/// `policy.max_retries`.
///
/// `op` receives the 0-indexed attempt number. `on_retry` fires once per
/// backoff sleep. When `cancel` fires, no further attempt is made and a
/// pending sleep is cut short; the result is then
/// [`BrainstormError::Cancelled`].
pub async fn retry_with_backoff<T, F, Fut, P, R>(
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    is_transient: P,
    mut on_retry: R,
    mut op: F,
) -> Result<T, BrainstormError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BrainstormError>>,
    P: Fn(&BrainstormError) -> bool,
    R: FnMut(&RetryEvent<'_>),
{
    let mut attempt = 0;
    loop {
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !is_transient(&err) || attempt >= policy.max_retries {
            return Err(err);
        }
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(BrainstormError::Cancelled);
        }

        let retry = attempt + 1;
        let delay = policy.delay_for(retry);

        tracing::warn!(
            retry,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Retrying after transient error: {}",
            err
        );
        on_retry(&RetryEvent {
            retry,
            max_retries: policy.max_retries,
            delay,
            error: &err,
        });

        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(BrainstormError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }

        attempt = retry;
    }
}

fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

/// Uniform sample in [0.0, 1.0]. Falls back to a hash of the retry number
/// if the OS entropy source is unavailable.
fn jitter_unit(retry: u32) -> f64 {
    let mut buf = [0u8; 8];
    match getrandom::getrandom(&mut buf) {
        Ok(()) => u64::from_le_bytes(buf) as f64 / u64::MAX as f64,
        Err(_) => retry.wrapping_mul(2654435761) as f64 / u32::MAX as f64,
    }
}
