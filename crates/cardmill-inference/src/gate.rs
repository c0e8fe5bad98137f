//! Summarization gate: cache over throttle over retry.
//!
//! Each concern is its own wrapper implementing [`Summarizer`], composed
//! in a fixed order so a cache hit never consumes a rate-limit slot and
//! retries happen inside the slot the throttle already granted. The
//! [`SummaryGate`] is the only entry point the pipeline uses.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, warn};

use cardmill_core::traits::Summarizer;
use cardmill_core::{defaults, Error, Result, Settings};

/// Tunables for the gate wrappers.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Attempts per dispatched call, including the first.
    pub max_retries: u32,
    /// Base backoff delay between attempts (doubles each retry).
    pub retry_base_secs: u64,
    /// Cap on a single backoff delay.
    pub retry_cap_secs: u64,
    /// Calls permitted per rate-limit period.
    pub rate_limit_calls: u32,
    /// Rate-limit period in seconds.
    pub rate_limit_period_secs: u64,
    /// Summary cache capacity.
    pub cache_maxsize: usize,
    /// Summary cache entry TTL in seconds.
    pub cache_expiry_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            retry_base_secs: defaults::RETRY_BASE_SECS,
            retry_cap_secs: defaults::RETRY_CAP_SECS,
            rate_limit_calls: defaults::RATE_LIMIT_CALLS,
            rate_limit_period_secs: defaults::RATE_LIMIT_PERIOD_SECS,
            cache_maxsize: defaults::CACHE_MAXSIZE,
            cache_expiry_secs: defaults::CACHE_EXPIRY_SECS,
        }
    }
}

impl GateConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retries,
            retry_base_secs: defaults::RETRY_BASE_SECS,
            retry_cap_secs: defaults::RETRY_CAP_SECS,
            rate_limit_calls: settings.rate_limit_calls,
            rate_limit_period_secs: settings.rate_limit_period_secs,
            cache_maxsize: settings.cache_maxsize,
            cache_expiry_secs: settings.cache_expiry_secs,
        }
    }
}

/// Retry wrapper: bounded attempts with doubling, capped backoff.
#[derive(Debug)]
pub struct Retrying<S> {
    inner: S,
    max_attempts: u32,
    base: Duration,
    cap: Duration,
}

impl<S> Retrying<S> {
    pub fn new(inner: S, max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base,
            cap,
        }
    }
}

#[async_trait]
impl<S: Summarizer> Summarizer for Retrying<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn summarize(&self, prompt: &str) -> Result<String> {
        let mut delay = self.base;
        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match self.inner.summarize(prompt).await {
                Ok(summary) => return Ok(summary),
                Err(e) => {
                    warn!(
                        provider = self.inner.name(),
                        attempt,
                        error = %e,
                        "Summarizer attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(delay.min(self.cap)).await;
                        delay = (delay * 2).min(self.cap);
                    }
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| Error::Summarizer("retry loop made no attempts".to_string())))
    }
}

/// Throttle wrapper: spaces dispatched calls at least `period / calls`
/// apart. Concurrent callers queue on successive slots.
#[derive(Debug)]
pub struct RateLimited<S> {
    inner: S,
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl<S> RateLimited<S> {
    pub fn new(inner: S, calls: u32, period: Duration) -> Self {
        Self {
            inner,
            min_interval: period / calls.max(1),
            next_slot: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<S: Summarizer> Summarizer for RateLimited<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn summarize(&self, prompt: &str) -> Result<String> {
        let slot = {
            let mut next = self.next_slot.lock().unwrap();
            let now = Instant::now();
            let at = match *next {
                Some(t) if t > now => t,
                _ => now,
            };
            *next = Some(at + self.min_interval);
            at
        };
        if slot > Instant::now() {
            debug!(provider = self.inner.name(), "Throttling summarizer call");
            tokio::time::sleep_until(slot).await;
        }
        self.inner.summarize(prompt).await
    }
}

fn cache_key(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cache wrapper: bounded LRU keyed by a hash of the full prompt, with a
/// per-entry TTL checked on read. Only successful summaries are cached.
#[derive(Debug)]
pub struct Cached<S> {
    inner: S,
    ttl: Duration,
    cache: Mutex<LruCache<String, (String, Instant)>>,
}

impl<S> Cached<S> {
    pub fn new(inner: S, maxsize: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(maxsize.max(1)).expect("capacity is at least one");
        Self {
            inner,
            ttl,
            cache: Mutex::new(LruCache::new(cap)),
        }
    }
}

#[async_trait]
impl<S: Summarizer> Summarizer for Cached<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn summarize(&self, prompt: &str) -> Result<String> {
        let key = cache_key(prompt);
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some((summary, stored_at)) = cache.get(&key) {
                // expired entries are left in place; the put below
                // overwrites them after a fresh call
                if stored_at.elapsed() < self.ttl {
                    debug!(provider = self.inner.name(), "Summary cache hit");
                    return Ok(summary.clone());
                }
            }
        }
        let summary = self.inner.summarize(prompt).await?;
        self.cache
            .lock()
            .unwrap()
            .put(key, (summary.clone(), Instant::now()));
        Ok(summary)
    }
}

/// Render the full provider prompt for a piece of source text.
pub fn render_prompt(text: &str) -> String {
    format!("{}{}", defaults::PROMPT_PREFIX, text)
}

type Chain = Cached<RateLimited<Retrying<Arc<dyn Summarizer>>>>;

/// Front door for summarization used by the pipeline.
///
/// With no provider configured, source text passes through untouched.
/// Otherwise the rendered prompt flows through cache, throttle, and
/// retry; a `None` result means the provider kept failing and the caller
/// should record the item as failed and move on.
pub struct SummaryGate {
    chain: Option<Chain>,
}

impl SummaryGate {
    pub fn new(provider: Option<Arc<dyn Summarizer>>, config: &GateConfig) -> Self {
        let chain = provider.map(|raw| {
            let retrying = Retrying::new(
                raw,
                config.max_retries,
                Duration::from_secs(config.retry_base_secs),
                Duration::from_secs(config.retry_cap_secs),
            );
            let limited = RateLimited::new(
                retrying,
                config.rate_limit_calls,
                Duration::from_secs(config.rate_limit_period_secs),
            );
            Cached::new(
                limited,
                config.cache_maxsize,
                Duration::from_secs(config.cache_expiry_secs),
            )
        });
        Self { chain }
    }

    /// A gate with no provider: every text passes through unchanged.
    pub fn passthrough() -> Self {
        Self { chain: None }
    }

    pub fn is_passthrough(&self) -> bool {
        self.chain.is_none()
    }

    pub async fn summarize(&self, text: &str) -> Option<String> {
        let Some(chain) = &self.chain else {
            return Some(text.to_string());
        };
        let prompt = render_prompt(text);
        match chain.summarize(&prompt).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(provider = chain.name(), error = %e, "Summarization gave up");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSummarizer;

    fn fast_config() -> GateConfig {
        GateConfig {
            rate_limit_period_secs: 0,
            ..GateConfig::default()
        }
    }

    fn gate_with(mock: &MockSummarizer, config: GateConfig) -> SummaryGate {
        SummaryGate::new(Some(Arc::new(mock.clone())), &config)
    }

    #[tokio::test]
    async fn passthrough_returns_text_unchanged() {
        let gate = SummaryGate::passthrough();
        assert!(gate.is_passthrough());
        assert_eq!(
            gate.summarize("raw heading text").await,
            Some("raw heading text".to_string())
        );
    }

    #[tokio::test]
    async fn prompt_carries_the_instruction_prefix() {
        let mock = MockSummarizer::new();
        let gate = gate_with(&mock, fast_config());
        gate.summarize("some text").await.unwrap();
        let prompt = &mock.calls()[0];
        assert!(prompt.starts_with(defaults::PROMPT_PREFIX));
        assert!(prompt.ends_with("some text"));
    }

    #[tokio::test]
    async fn cache_hit_invokes_provider_once() {
        let mock = MockSummarizer::new();
        let gate = gate_with(&mock, fast_config());
        let first = gate.summarize("identical text").await;
        let second = gate.summarize("identical text").await;
        assert_eq!(first, second);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn distinct_texts_are_not_conflated() {
        let mock = MockSummarizer::new();
        let gate = gate_with(&mock, fast_config());
        gate.summarize("text one").await.unwrap();
        gate.summarize("text two").await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_entries_expire() {
        let mock = MockSummarizer::new();
        let config = GateConfig {
            cache_expiry_secs: 10,
            ..fast_config()
        };
        let gate = gate_with(&mock, config);
        gate.summarize("text").await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        gate.summarize("text").await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_spaces_dispatched_calls() {
        let mock = MockSummarizer::new();
        let config = GateConfig {
            rate_limit_calls: 3,
            rate_limit_period_secs: 3,
            ..GateConfig::default()
        };
        let gate = gate_with(&mock, config);

        let started = Instant::now();
        gate.summarize("one").await.unwrap();
        gate.summarize("two").await.unwrap();
        gate.summarize("three").await.unwrap();
        // one-second spacing between dispatches: third call starts at +2s
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_repeat_skips_the_throttle() {
        let mock = MockSummarizer::new();
        let config = GateConfig {
            rate_limit_calls: 1,
            rate_limit_period_secs: 60,
            ..GateConfig::default()
        };
        let gate = gate_with(&mock, config);
        gate.summarize("text").await.unwrap();

        let started = Instant::now();
        gate.summarize("text").await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let mock = MockSummarizer::new().failing_times(2);
        let gate = gate_with(&mock, fast_config());
        let result = gate.summarize("flaky").await;
        assert_eq!(result, Some("mock summary".to_string()));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_yield_none() {
        let mock = MockSummarizer::new().always_failing();
        let config = GateConfig {
            max_retries: 3,
            ..fast_config()
        };
        let gate = gate_with(&mock, config);
        assert_eq!(gate.summarize("doomed").await, None);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_and_caps() {
        let mock = MockSummarizer::new().always_failing();
        let retrying = Retrying::new(
            mock.clone(),
            4,
            Duration::from_secs(4),
            Duration::from_secs(10),
        );
        let started = Instant::now();
        assert!(retrying.summarize("p").await.is_err());
        // delays between the four attempts: 4s, 8s, then capped at 10s
        assert_eq!(started.elapsed(), Duration::from_secs(22));
    }

    #[test]
    fn cache_key_is_stable_and_distinct() {
        assert_eq!(cache_key("a"), cache_key("a"));
        assert_ne!(cache_key("a"), cache_key("b"));
        assert_eq!(cache_key("a").len(), 64);
    }
}
