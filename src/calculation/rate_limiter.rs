use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

/// token bucket for one caller
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: Decimal,
    last_update: DateTime<Utc>,
}

impl TokenBucket {
    fn new(capacity: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    /// take one token, or report the seconds until one is available
    fn try_consume(&mut self, per_minute: Decimal, capacity: Decimal, now: DateTime<Utc>) -> Result<(), u64> {
        let elapsed_ms = (now - self.last_update).num_milliseconds().max(0);
        let refill = Decimal::from(elapsed_ms) * per_minute / Decimal::from(60_000);
        self.tokens = (self.tokens + refill).min(capacity);
        if now > self.last_update {
            self.last_update = now;
        }

        if self.tokens >= Decimal::ONE {
            self.tokens -= Decimal::ONE;
            return Ok(());
        }

        let missing = Decimal::ONE - self.tokens;
        let wait = (missing * Decimal::from(60) / per_minute).ceil();
        Err(u64::try_from(wait).unwrap_or(60).max(1))
    }
}

/// per-caller limiter refilled continuously at `calls_per_minute`
///
/// once more than `max_tracked` callers are held, a new caller triggers a
/// sweep of buckets idle for a full refill window
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<RwLock<HashMap<String, TokenBucket>>>,
    per_minute: Decimal,
    capacity: Decimal,
    max_tracked: usize,
}

impl RateLimiter {
    pub fn new(calls_per_minute: u32) -> Self {
        let limit = Decimal::from(calls_per_minute.max(1));
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            per_minute: limit,
            capacity: limit,
            max_tracked: 10_000,
        }
    }

    pub fn with_max_tracked(mut self, max_tracked: usize) -> Self {
        self.max_tracked = max_tracked.max(1);
        self
    }

    /// consume one call for `caller`; `Err` carries retry-after seconds
    pub async fn check(&self, caller: &str, now: DateTime<Utc>) -> Result<(), u64> {
        let mut buckets = self.buckets.write().await;
        if buckets.len() >= self.max_tracked && !buckets.contains_key(caller) {
            let before = buckets.len();
            // a bucket idle for a minute is full again, same as a fresh one
            buckets.retain(|_, bucket| now - bucket.last_update < Duration::minutes(1));
            debug!(swept = before - buckets.len(), "idle rate limit buckets swept");
        }
        let bucket = buckets
            .entry(caller.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity, now));
        bucket.try_consume(self.per_minute, self.capacity, now)
    }

    /// whole calls left for `caller`
    pub async fn remaining(&self, caller: &str) -> u32 {
        let buckets = self.buckets.read().await;
        let tokens = buckets.get(caller).map(|b| b.tokens).unwrap_or(self.capacity);
        u32::try_from(tokens.floor()).unwrap_or(0)
    }

    pub async fn tracked_callers(&self) -> usize {
        self.buckets.read().await.len()
    }

    /// drop buckets idle for longer than `max_idle`
    pub async fn cleanup(&self, now: DateTime<Utc>, max_idle: Duration) {
        let mut buckets = self.buckets.write().await;
        buckets.retain(|_, bucket| now - bucket.last_update < max_idle);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_limit_per_minute() {
        let limiter = RateLimiter::new(100);
        for _ in 0..100 {
            assert!(limiter.check("203.0.113.7", now()).await.is_ok());
        }
        let retry_after = limiter.check("203.0.113.7", now()).await.unwrap_err();
        assert_eq!(retry_after, 1);
        assert_eq!(limiter.remaining("203.0.113.7").await, 0);
    }

    #[tokio::test]
    async fn test_callers_have_separate_buckets() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("a", now()).await.is_ok());
        assert!(limiter.check("b", now()).await.is_ok());
        assert_eq!(limiter.check("a", now()).await, Err(60));
    }

    #[tokio::test]
    async fn test_tokens_refill_over_time() {
        let limiter = RateLimiter::new(60);
        for _ in 0..60 {
            limiter.check("a", now()).await.unwrap();
        }
        assert!(limiter.check("a", now()).await.is_err());
        assert!(limiter.check("a", now() + Duration::seconds(1)).await.is_ok());
        assert!(limiter.check("a", now() + Duration::seconds(1)).await.is_err());
        assert!(limiter.check("a", now() + Duration::minutes(2)).await.is_ok());
        assert_eq!(limiter.remaining("a").await, 59);
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_callers() {
        let limiter = RateLimiter::new(5);
        limiter.check("a", now()).await.unwrap();
        limiter.cleanup(now() + Duration::hours(2), Duration::hours(1)).await;
        assert_eq!(limiter.remaining("a").await, 5);
    }

    #[tokio::test]
    async fn test_new_caller_sweeps_full_buckets_past_the_limit() {
        let limiter = RateLimiter::new(10).with_max_tracked(2);
        limiter.check("a", now()).await.unwrap();
        limiter.check("b", now() + Duration::seconds(30)).await.unwrap();

        // "a" has been idle a full minute, "b" has not
        limiter.check("c", now() + Duration::seconds(61)).await.unwrap();
        assert_eq!(limiter.tracked_callers().await, 2);
        assert_eq!(limiter.remaining("a").await, 10);
        assert_eq!(limiter.remaining("b").await, 9);
    }
}
