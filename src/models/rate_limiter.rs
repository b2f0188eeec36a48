use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::storage::KvStore;

/// Client id used when a request carries none.
pub const ANONYMOUS_CLIENT: &str = "anon";

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub enable_rate_limiting: bool,
    pub window: Duration,
    pub max_requests: u32,
    /// Lifetime of a window's counter; outlives the window slightly.
    pub ttl: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enable_rate_limiting: true,
            window: Duration::from_secs(600),
            max_requests: 60,
            ttl: Duration::from_secs(660),
        }
    }
}

/// Outcome of one admission check, with what the caller needs for headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub count: u64,
    pub limit: u32,
    /// Seconds until the current window closes.
    pub reset_after: u64,
}

impl RateDecision {
    pub fn remaining(&self) -> u64 {
        (self.limit as u64).saturating_sub(self.count)
    }
}

/// Fixed-window request counter per client, persisted in a `KvStore`.
///
/// The read-increment-write cycle is not atomic. Concurrent requests from one
/// client inside one window can under-count.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, config: RateLimiterConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    pub async fn admit(&self, client_id: Option<&str>) -> bool {
        self.check(client_id).await.allowed
    }

    pub async fn check(&self, client_id: Option<&str>) -> RateDecision {
        self.check_at(client_id, Utc::now().timestamp().max(0) as u64)
            .await
    }

    /// Counts one request at `now` (unix seconds) and decides admission.
    pub async fn check_at(&self, client_id: Option<&str>, now: u64) -> RateDecision {
        let window_secs = self.config.window.as_secs().max(1);
        let reset_after = window_secs - now % window_secs;

        if !self.config.enable_rate_limiting {
            return RateDecision {
                allowed: true,
                count: 0,
                limit: self.config.max_requests,
                reset_after,
            };
        }

        let key = bucket_key(client_id, now / window_secs);

        let current = match self.store.get(&key).await {
            Ok(value) => value.and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(0),
            Err(e) => {
                warn!(key = %key, error = %e, "Rate limit counter read failed, counting from zero");
                0
            }
        };

        // Rejected requests still count against the window.
        let count = current + 1;
        if let Err(e) = self
            .store
            .put(&key, &count.to_string(), self.config.ttl)
            .await
        {
            warn!(key = %key, error = %e, "Rate limit counter write failed");
        }

        let allowed = count <= self.config.max_requests as u64;
        debug!(key = %key, count, limit = self.config.max_requests, allowed, "Rate limit check");

        RateDecision {
            allowed,
            count,
            limit: self.config.max_requests,
            reset_after,
        }
    }
}

fn bucket_key(client_id: Option<&str>, epoch: u64) -> String {
    let client = client_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(ANONYMOUS_CLIENT);
    format!("ratelimit:{}:{}", client, epoch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::storage::MemoryKvStore;
    use async_trait::async_trait;

    fn limiter(store: Arc<dyn KvStore>) -> RateLimiter {
        RateLimiter::new(store, RateLimiterConfig::default())
    }

    #[test]
    fn test_bucket_key() {
        assert_eq!(bucket_key(Some("alice"), 7), "ratelimit:alice:7");
        assert_eq!(bucket_key(None, 7), "ratelimit:anon:7");
        assert_eq!(bucket_key(Some("  "), 7), "ratelimit:anon:7");
    }

    #[tokio::test]
    async fn test_sixty_first_request_in_window_is_rejected() {
        let store = Arc::new(MemoryKvStore::new());
        let limiter = limiter(store.clone());
        let now = 6_000;

        for i in 1..=60 {
            let decision = limiter.check_at(Some("alice"), now + i).await;
            assert!(decision.allowed, "request {} should pass", i);
            assert_eq!(decision.count, i);
        }

        let decision = limiter.check_at(Some("alice"), now + 61).await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining(), 0);

        // Rejections keep counting.
        let decision = limiter.check_at(Some("alice"), now + 62).await;
        assert!(!decision.allowed);
        assert_eq!(decision.count, 62);
        assert_eq!(
            store.get("ratelimit:alice:10").await.unwrap(),
            Some("62".to_string())
        );
    }

    #[tokio::test]
    async fn test_clients_and_windows_are_independent() {
        let limiter = limiter(Arc::new(MemoryKvStore::new()));

        for _ in 0..60 {
            limiter.check_at(Some("alice"), 6_000).await;
        }
        assert!(!limiter.check_at(Some("alice"), 6_001).await.allowed);
        assert!(limiter.check_at(Some("bob"), 6_001).await.allowed);
        assert!(limiter.check_at(None, 6_001).await.allowed);

        let next_window = limiter.check_at(Some("alice"), 6_600).await;
        assert!(next_window.allowed);
        assert_eq!(next_window.count, 1);
        assert_eq!(next_window.reset_after, 600);
    }

    #[tokio::test]
    async fn test_disabled_limiter_never_touches_store() {
        let store = Arc::new(MemoryKvStore::new());
        let config = RateLimiterConfig {
            enable_rate_limiting: false,
            ..RateLimiterConfig::default()
        };
        let limiter = RateLimiter::new(store.clone(), config);

        for _ in 0..100 {
            assert!(limiter.admit(Some("alice")).await);
        }
        assert!(store.is_empty());
    }

    struct BrokenStore;

    #[async_trait]
    impl KvStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::storage("unreachable"))
        }

        async fn put(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(Error::storage("unreachable"))
        }

        async fn ping(&self) -> Result<()> {
            Err(Error::storage("unreachable"))
        }

        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_store_failures_do_not_fail_requests() {
        let limiter = limiter(Arc::new(BrokenStore));
        let decision = limiter.check_at(Some("alice"), 6_000).await;
        assert!(decision.allowed);
        assert_eq!(decision.count, 1);
    }

    #[tokio::test]
    async fn test_garbage_counter_counts_as_zero() {
        let store = Arc::new(MemoryKvStore::new());
        store
            .put("ratelimit:alice:10", "not-a-number", Duration::from_secs(60))
            .await
            .unwrap();
        let decision = limiter(store).check_at(Some("alice"), 6_000).await;
        assert_eq!(decision.count, 1);
    }
}
