// src/provider/rate_limit.rs — Per-provider request gate
//
// Caps in-flight requests per provider and spaces request starts by a
// minimum delay. One limiter per provider name, shared by every run task
// that targets it, discarded when the run ends.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::infra::config::RateLimitConfig;
use crate::infra::errors::BrainstormError;

/// Grant timestamps kept per limiter.
const HISTORY_CAP: usize = 100;

/// Fallback row for providers missing from the table.
const GENERIC_PROVIDER: &str = "Custom";

/// (provider, min_delay seconds, max_concurrent). Local engines serve one
/// request at a time; hosted APIs get an effectively unbounded ceiling.
const DEFAULT_LIMITS: &[(&str, f64, usize)] = &[
    ("OpenAI", 1.0, 100),
    ("Anthropic", 1.0, 100),
    ("Ollama", 1.0, 1),
    ("OpenRouter", 2.0, 100),
    ("TogetherAI", 2.0, 100),
    ("LMStudio", 1.0, 1),
    ("Gemini", 1.0, 100),
    ("Custom", 1.0, 100),
];

/// Effective limiter parameters for one provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderLimits {
    pub min_delay: Duration,
    pub max_concurrent: usize,
}

impl ProviderLimits {
    /// Table row for `provider` (case-insensitive), if it is a known provider.
    pub fn lookup(provider: &str) -> Option<Self> {
        DEFAULT_LIMITS
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(provider))
            .map(|&(_, delay, max)| Self {
                min_delay: Duration::from_secs_f64(delay),
                max_concurrent: max,
            })
    }

    /// Table row for `provider`, or the generic row when unknown.
    pub fn for_provider(provider: &str) -> Self {
        Self::lookup(provider)
            .or_else(|| Self::lookup(GENERIC_PROVIDER))
            .unwrap_or(Self {
                min_delay: Duration::from_secs(1),
                max_concurrent: 100,
            })
    }

    pub fn is_known(provider: &str) -> bool {
        Self::lookup(provider).is_some()
    }

    /// Table row with any configured override applied on top.
    pub fn resolve(provider: &str, overrides: &HashMap<String, RateLimitConfig>) -> Self {
        let mut limits = Self::for_provider(provider);
        if let Some(o) = find_override(provider, overrides) {
            if let Some(d) = o.min_delay {
                limits.min_delay = secs(d);
            }
            if let Some(m) = o.max_concurrent {
                limits.max_concurrent = m.max(1);
            }
        }
        limits
    }
}

fn find_override<'a>(
    provider: &str,
    overrides: &'a HashMap<String, RateLimitConfig>,
) -> Option<&'a RateLimitConfig> {
    overrides
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(provider))
        .map(|(_, o)| o)
}

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

/// Gate for a single provider.
pub struct RateLimiter {
    provider: String,
    min_delay: Duration,
    max_concurrent: usize,
    slots: Arc<Semaphore>,
    grants: Mutex<VecDeque<Instant>>,
}

/// Holds one concurrency slot; released exactly once on drop.
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct RateLimitPermit {
    _slot: OwnedSemaphorePermit,
    granted_at: Instant,
}

impl RateLimitPermit {
    pub fn granted_at(&self) -> Instant {
        self.granted_at
    }
}

impl RateLimiter {
    /// Build a limiter, filling unset values from the defaults table.
    pub fn new(
        provider: impl Into<String>,
        min_delay: Option<Duration>,
        max_concurrent: Option<usize>,
    ) -> Self {
        let provider = provider.into();
        let defaults = ProviderLimits::for_provider(&provider);
        Self::with_limits(
            provider,
            ProviderLimits {
                min_delay: min_delay.unwrap_or(defaults.min_delay),
                max_concurrent: max_concurrent.unwrap_or(defaults.max_concurrent),
            },
        )
    }

    pub fn with_limits(provider: impl Into<String>, limits: ProviderLimits) -> Self {
        let max_concurrent = limits.max_concurrent.max(1);
        Self {
            provider: provider.into(),
            min_delay: limits.min_delay,
            max_concurrent,
            slots: Arc::new(Semaphore::new(max_concurrent)),
            grants: Mutex::new(VecDeque::with_capacity(HISTORY_CAP)),
        }
    }

    /// Wait for a free slot, then for `min_delay` since the previous grant.
    ///
    /// Fails with [`BrainstormError::Cancelled`] once the limiter is closed.
    pub async fn acquire(&self) -> Result<RateLimitPermit, BrainstormError> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BrainstormError::Cancelled)?;

        // Starts are serialized: the lock is held through the spacing sleep.
        let mut grants = self.grants.lock().await;
        if let Some(last) = grants.back() {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }
        if self.slots.is_closed() {
            return Err(BrainstormError::Cancelled);
        }

        let now = Instant::now();
        grants.push_back(now);
        if grants.len() > HISTORY_CAP {
            grants.pop_front();
        }
        drop(grants);

        tracing::debug!(
            provider = %self.provider,
            active = self.active(),
            max_concurrent = self.max_concurrent,
            "Rate limiter granted slot"
        );

        Ok(RateLimitPermit {
            _slot: slot,
            granted_at: now,
        })
    }

    /// Refuse all further acquisitions and wake every waiter.
    pub fn close(&self) {
        self.slots.close();
    }

    /// Requests currently holding a slot.
    pub fn active(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.slots.available_permits())
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Recent grant timestamps, oldest first.
    pub async fn grant_history(&self) -> Vec<Instant> {
        self.grants.lock().await.iter().copied().collect()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("provider", &self.provider)
            .field("min_delay", &self.min_delay)
            .field("max_concurrent", &self.max_concurrent)
            .field("active", &self.active())
            .finish()
    }
}

/// Limiter parameters for one provider, merged across groups.
#[derive(Debug, Clone)]
struct Requested {
    /// Spelling of the first group that named this provider.
    name: String,
    limits: ProviderLimits,
    conflicting: bool,
}

/// The limiters for one orchestration run, keyed by provider name
/// (case-insensitive).
///
/// Several groups may name the same provider. Each group's values, with
/// unset ones resolved to the provider default, are merged so the most
/// conservative one wins (longest delay, lowest concurrency).
#[derive(Debug, Default)]
pub struct LimiterSet {
    overrides: HashMap<String, RateLimitConfig>,
    requested: HashMap<String, Requested>,
    limiters: HashMap<String, Arc<RateLimiter>>,
}

impl LimiterSet {
    pub fn new(overrides: HashMap<String, RateLimitConfig>) -> Self {
        Self {
            overrides,
            ..Default::default()
        }
    }

    /// True when the provider is in the table or has a configured override.
    pub fn has_defaults_for(&self, provider: &str) -> bool {
        ProviderLimits::is_known(provider) || find_override(provider, &self.overrides).is_some()
    }

    /// Record one group's requested limits for `provider`.
    pub fn request(
        &mut self,
        provider: &str,
        min_delay: Option<Duration>,
        max_concurrent: Option<usize>,
    ) {
        let defaults = ProviderLimits::resolve(provider, &self.overrides);
        let wanted = ProviderLimits {
            min_delay: min_delay.unwrap_or(defaults.min_delay),
            max_concurrent: max_concurrent.unwrap_or(defaults.max_concurrent),
        };
        match self.requested.entry(provider.to_lowercase()) {
            Entry::Occupied(mut slot) => {
                let merged = slot.get_mut();
                merged.conflicting |= merged.limits != wanted;
                merged.limits.min_delay = merged.limits.min_delay.max(wanted.min_delay);
                merged.limits.max_concurrent =
                    merged.limits.max_concurrent.min(wanted.max_concurrent);
            }
            Entry::Vacant(slot) => {
                slot.insert(Requested {
                    name: provider.to_string(),
                    limits: wanted,
                    conflicting: false,
                });
            }
        }
    }

    /// Create one limiter per requested provider.
    pub fn build(mut self) -> Self {
        for (key, req) in std::mem::take(&mut self.requested) {
            let provider = req.name;
            let limits = req.limits;
            if req.conflicting {
                tracing::warn!(
                    provider = %provider,
                    min_delay_ms = limits.min_delay.as_millis() as u64,
                    max_concurrent = limits.max_concurrent,
                    "Run groups disagree on rate limits; using the most conservative values"
                );
            }
            self.limiters
                .insert(key, Arc::new(RateLimiter::with_limits(provider, limits)));
        }
        self
    }

    pub fn get(&self, provider: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.get(&provider.to_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    pub fn close_all(&self) {
        for limiter in self.limiters.values() {
            limiter.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_table_local_engines_serialize() {
        assert_eq!(ProviderLimits::for_provider("Ollama").max_concurrent, 1);
        assert_eq!(ProviderLimits::for_provider("LMStudio").max_concurrent, 1);
        assert_eq!(ProviderLimits::for_provider("OpenAI").max_concurrent, 100);
        assert_eq!(
            ProviderLimits::for_provider("OpenRouter").min_delay,
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_lookup_case_insensitive() {
        assert_eq!(
            ProviderLimits::lookup("ollama"),
            ProviderLimits::lookup("Ollama")
        );
        assert!(ProviderLimits::is_known("togetherai"));
    }

    #[test]
    fn test_unknown_provider_falls_back_to_generic() {
        assert!(!ProviderLimits::is_known("MyLab"));
        let l = ProviderLimits::for_provider("MyLab");
        assert_eq!(l, ProviderLimits::for_provider("Custom"));
    }

    #[test]
    fn test_resolve_applies_override() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "ollama".to_string(),
            RateLimitConfig {
                min_delay: Some(0.25),
                max_concurrent: None,
            },
        );
        let l = ProviderLimits::resolve("Ollama", &overrides);
        assert_eq!(l.min_delay, Duration::from_millis(250));
        assert_eq!(l.max_concurrent, 1);
    }

    #[test]
    fn test_new_uses_defaults_for_missing_values() {
        let l = RateLimiter::new("Ollama", None, None);
        assert_eq!(l.max_concurrent(), 1);
        assert_eq!(l.min_delay(), Duration::from_secs(1));

        let l = RateLimiter::new("Ollama", Some(Duration::ZERO), Some(3));
        assert_eq!(l.max_concurrent(), 3);
        assert_eq!(l.min_delay(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_release_on_drop() {
        let l = RateLimiter::new("OpenAI", Some(Duration::ZERO), Some(2));
        let a = l.acquire().await.unwrap();
        let b = l.acquire().await.unwrap();
        assert_eq!(l.active(), 2);
        drop(a);
        assert_eq!(l.active(), 1);
        drop(b);
        assert_eq!(l.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_delay_spacing() {
        let l = RateLimiter::new("OpenAI", Some(Duration::from_millis(500)), Some(10));
        for _ in 0..4 {
            let _p = l.acquire().await.unwrap();
        }
        let history = l.grant_history().await;
        assert_eq!(history.len(), 4);
        for pair in history.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap_under_contention() {
        let l = Arc::new(RateLimiter::new("LMStudio", Some(Duration::ZERO), Some(2)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let l = l.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _permit = l.acquire().await.unwrap();
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(l.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_released_when_holder_panics() {
        let l = Arc::new(RateLimiter::new("Ollama", Some(Duration::ZERO), None));
        let held = l.clone();
        let result = tokio::spawn(async move {
            let _permit = held.acquire().await.unwrap();
            panic!("collaborator blew up");
        })
        .await;
        assert!(result.is_err());
        assert_eq!(l.active(), 0);
        // The single slot is usable again.
        let _p = l.acquire().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_capped() {
        let l = RateLimiter::new("OpenAI", Some(Duration::ZERO), None);
        for _ in 0..(HISTORY_CAP + 20) {
            let _p = l.acquire().await.unwrap();
        }
        assert_eq!(l.grant_history().await.len(), HISTORY_CAP);
    }

    #[tokio::test]
    async fn test_closed_limiter_rejects_acquire() {
        let l = RateLimiter::new("Ollama", Some(Duration::ZERO), None);
        l.close();
        assert!(matches!(l.acquire().await, Err(BrainstormError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_wakes_waiters() {
        let l = Arc::new(RateLimiter::new("Ollama", Some(Duration::ZERO), None));
        let holder = l.acquire().await.unwrap();
        let waiter = {
            let l = l.clone();
            tokio::spawn(async move { l.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        l.close();
        let outcome = waiter.await.unwrap();
        assert!(matches!(outcome, Err(BrainstormError::Cancelled)));
        drop(holder);
    }

    #[test]
    fn test_limiter_set_merges_conservatively() {
        let mut set = LimiterSet::new(HashMap::new());
        set.request("OpenAI", Some(Duration::from_secs(1)), Some(5));
        set.request("OpenAI", Some(Duration::from_secs(3)), Some(8));
        set.request("OpenAI", None, Some(2));
        set.request("Ollama", None, None);
        let set = set.build();

        assert_eq!(set.len(), 2);
        let openai = set.get("OpenAI").unwrap();
        assert_eq!(openai.min_delay(), Duration::from_secs(3));
        assert_eq!(openai.max_concurrent(), 2);

        let ollama = set.get("Ollama").unwrap();
        assert_eq!(ollama.max_concurrent(), 1);
        assert!(set.get("Gemini").is_none());
    }

    #[test]
    fn test_limiter_set_unset_group_keeps_provider_default() {
        let mut set = LimiterSet::new(HashMap::new());
        set.request("OpenRouter", Some(Duration::ZERO), None);
        set.request("OpenRouter", None, None);
        let set = set.build();

        let limiter = set.get("OpenRouter").unwrap();
        assert_eq!(limiter.min_delay(), Duration::from_secs(2));
        assert_eq!(limiter.max_concurrent(), 100);
    }

    #[test]
    fn test_limiter_set_unset_group_keeps_configured_default() {
        let overrides = HashMap::from([(
            "Ollama".to_string(),
            RateLimitConfig {
                min_delay: Some(4.0),
                max_concurrent: Some(2),
            },
        )]);
        let mut set = LimiterSet::new(overrides);
        set.request("Ollama", Some(Duration::from_secs(1)), Some(8));
        set.request("Ollama", None, None);
        let set = set.build();

        let limiter = set.get("Ollama").unwrap();
        assert_eq!(limiter.min_delay(), Duration::from_secs(4));
        assert_eq!(limiter.max_concurrent(), 2);
    }

    #[test]
    fn test_limiter_set_ignores_provider_case() {
        let mut set = LimiterSet::new(HashMap::new());
        set.request("OpenAI", Some(Duration::from_secs(2)), None);
        set.request("openai", None, Some(3));
        let set = set.build();

        assert_eq!(set.len(), 1);
        let limiter = set.get("OPENAI").unwrap();
        assert_eq!(limiter.provider(), "OpenAI");
        assert_eq!(limiter.min_delay(), Duration::from_secs(2));
        assert_eq!(limiter.max_concurrent(), 3);
    }

    #[test]
    fn test_limiter_set_knows_overridden_providers() {
        let mut overrides = HashMap::new();
        overrides.insert("MyLab".to_string(), RateLimitConfig::default());
        let set = LimiterSet::new(overrides);
        assert!(set.has_defaults_for("MyLab"));
        assert!(set.has_defaults_for("OpenAI"));
        assert!(!set.has_defaults_for("Elsewhere"));
    }
}
