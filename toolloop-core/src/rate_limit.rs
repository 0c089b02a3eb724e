//! Client-side throttle for outbound completion calls.
//!
//! Token-based services meter tokens per time window, so the limiter keeps a
//! FIFO of `(timestamp, tokens)` records for completed calls and compares the
//! usage still inside the window against a conservative estimate of the next
//! call's cost. A minimum cooldown between calls is enforced on top of that.
//!
//! The limiter never fails. A 429 from the service is the caller's concern.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Wait used when capacity is short but there is no record to age out.
const FALLBACK_WAIT: Duration = Duration::from_secs(1);

/// Rate limiter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum time between two calls
    pub cooldown: Duration,
    /// Tokens allowed inside one window
    pub token_budget: u64,
    /// Sliding window length
    pub window: Duration,
    /// Response token ceiling of each call
    pub max_tokens: u32,
    /// Allowance for prompt tokens on top of `max_tokens`
    pub prompt_buffer: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(3),
            token_budget: 20_000,
            window: Duration::from_secs(60),
            max_tokens: 16_384,
            prompt_buffer: 1_000,
        }
    }
}

impl RateLimitConfig {
    /// Conservative upper bound for the cost of the next call.
    pub fn estimated_call_cost(&self) -> u64 {
        u64::from(self.max_tokens) + self.prompt_buffer
    }
}

/// Tokens consumed by one completed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub timestamp: Instant,
    pub tokens: u64,
}

/// Snapshot of usage inside the current window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub window_secs: f64,
    pub token_limit: u64,
    pub current_usage: u64,
    pub available_tokens: i64,
    pub usage_percent: f64,
    pub request_count: usize,
    pub time_until_full_capacity_secs: f64,
}

/// Sliding-window token limiter with a cooldown floor.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    records: VecDeque<RateLimitRecord>,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            records: VecDeque::new(),
            last_call: None,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait until it is safe to issue the next call. Returns the time spent waiting.
    pub async fn acquire(&mut self) -> Duration {
        let started = Instant::now();

        let cooldown = self.cooldown_remaining(started);
        if !cooldown.is_zero() {
            debug!("Minimum cooldown: waiting {:.2} seconds", cooldown.as_secs_f64());
            sleep(cooldown).await;
        }

        if let Some(wait) = self.budget_wait(Instant::now()) {
            debug!(
                "Rate limiting: waiting {:.2} seconds to free up tokens. Current usage: {}/{} tokens",
                wait.as_secs_f64(),
                self.current_usage(),
                self.config.token_budget
            );
            sleep(wait).await;
        }

        started.elapsed()
    }

    /// Record the actual token usage of a completed call.
    pub fn record(&mut self, tokens: u64) {
        let now = Instant::now();
        self.records.push_back(RateLimitRecord {
            timestamp: now,
            tokens,
        });
        self.last_call = Some(now);
        debug!("Recorded {} tokens ({} records in window)", tokens, self.records.len());
    }

    /// Record a completed call whose usage was not reported.
    pub fn record_estimate(&mut self) {
        let estimate = self.config.estimated_call_cost();
        warn!(
            "Token usage information not available in response, using estimate: {} tokens",
            estimate
        );
        self.record(estimate);
    }

    /// Time left before the cooldown floor is satisfied.
    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        match self.last_call {
            Some(last) => self
                .config
                .cooldown
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Evict expired records and compute the budget wait, if any is needed.
    pub fn budget_wait(&mut self, now: Instant) -> Option<Duration> {
        self.evict_expired(now);

        let needed = self.config.estimated_call_cost();
        let available = self.config.token_budget.saturating_sub(self.current_usage());
        if available >= needed {
            return None;
        }

        let Some(oldest) = self.records.front() else {
            warn!("Rate limit calculation issue - no history but insufficient capacity");
            return Some(FALLBACK_WAIT);
        };

        // Proportional approximation: wait for the share of the oldest
        // record's remaining lifetime that covers the deficit. Capped at one
        // full expiry so the wait is always bounded by the window.
        let deficit = needed - available;
        let fraction = (deficit as f64 / oldest.tokens.max(1) as f64).min(1.0);
        let until_expiry =
            (oldest.timestamp + self.config.window).saturating_duration_since(now);

        Some(until_expiry.mul_f64(fraction))
    }

    /// Usage statistics for the current window.
    pub fn stats(&mut self) -> UsageStats {
        let now = Instant::now();
        self.evict_expired(now);

        let current_usage = self.current_usage();
        let token_limit = self.config.token_budget;
        let usage_percent = if token_limit > 0 {
            current_usage as f64 / token_limit as f64 * 100.0
        } else {
            0.0
        };

        let time_until_full_capacity = match self.records.front() {
            Some(oldest) if current_usage > 0 => {
                (oldest.timestamp + self.config.window).saturating_duration_since(now)
            }
            _ => Duration::ZERO,
        };

        UsageStats {
            window_secs: self.config.window.as_secs_f64(),
            token_limit,
            current_usage,
            available_tokens: token_limit as i64 - current_usage as i64,
            usage_percent,
            request_count: self.records.len(),
            time_until_full_capacity_secs: time_until_full_capacity.as_secs_f64(),
        }
    }

    fn current_usage(&self) -> u64 {
        self.records.iter().map(|r| r.tokens).sum()
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(front) = self.records.front() {
            if now.saturating_duration_since(front.timestamp) > self.config.window {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn window_config() -> RateLimitConfig {
        RateLimitConfig {
            cooldown: Duration::ZERO,
            token_budget: 20_000,
            window: Duration::from_secs(60),
            max_tokens: 0,
            prompt_buffer: 1_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_call_proceeds_immediately() {
        let mut limiter = RateLimiter::new(RateLimitConfig::default());
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_is_a_hard_floor() {
        let mut limiter = RateLimiter::new(RateLimitConfig {
            cooldown: Duration::from_secs(3),
            ..window_config()
        });
        limiter.record(10);
        advance(Duration::from_secs(1)).await;

        let waited = limiter.acquire().await;
        assert_eq!(waited, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_when_window_is_nearly_full() {
        let mut limiter = RateLimiter::new(window_config());
        limiter.record(19_500);
        advance(Duration::from_secs(1)).await;

        let wait = limiter.budget_wait(Instant::now()).expect("should need to wait");
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(59));

        // The paused clock advances in whole timer ticks.
        let waited = limiter.acquire().await;
        assert!(waited >= wait);
        assert!(waited < wait + Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_proceeds_once_window_has_elapsed() {
        let mut limiter = RateLimiter::new(window_config());
        limiter.record(19_500);
        advance(Duration::from_secs(61)).await;

        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.stats().request_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_never_exceeds_oldest_expiry() {
        let mut limiter = RateLimiter::new(RateLimitConfig {
            max_tokens: 15_000,
            ..window_config()
        });
        // A tiny oldest record would give a fraction far above one.
        limiter.record(1);
        limiter.record(19_000);
        advance(Duration::from_secs(10)).await;

        let wait = limiter.budget_wait(Instant::now()).unwrap();
        assert_eq!(wait, Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_when_budget_below_single_call() {
        let mut limiter = RateLimiter::new(RateLimitConfig {
            token_budget: 500,
            ..window_config()
        });
        assert_eq!(limiter.budget_wait(Instant::now()), Some(FALLBACK_WAIT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_is_oldest_first() {
        let mut limiter = RateLimiter::new(window_config());
        limiter.record(5_000);
        advance(Duration::from_secs(30)).await;
        limiter.record(7_000);
        advance(Duration::from_secs(31)).await;

        let stats = limiter.stats();
        assert_eq!(stats.request_count, 1);
        assert_eq!(stats.current_usage, 7_000);
        assert_eq!(stats.available_tokens, 13_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_report_time_until_full_capacity() {
        let mut limiter = RateLimiter::new(window_config());
        limiter.record(10_000);
        advance(Duration::from_secs(15)).await;

        let stats = limiter.stats();
        assert!((stats.usage_percent - 50.0).abs() < f64::EPSILON);
        assert!((stats.time_until_full_capacity_secs - 45.0).abs() < 1e-6);
        assert!((stats.window_secs - 60.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_estimate_uses_call_cost() {
        let mut limiter = RateLimiter::new(RateLimitConfig {
            max_tokens: 4_096,
            ..window_config()
        });
        limiter.record_estimate();
        assert_eq!(limiter.stats().current_usage, 5_096);
    }
}
