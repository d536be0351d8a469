//! Token-bucket rate limiter
//!
//! Continuous (non-integer) token bucket per (user, route), stored in the
//! shared state store so that every process in a deployment draws from the
//! same budget. Bursts are smoothed rather than reset at window
//! boundaries: tokens refill at `capacity / window_seconds` per second and
//! are capped at `capacity`.
//!
//! The admission check is one read plus one write with no locking. Two
//! concurrent checks on the same key can both observe the stale token
//! count and both admit when only one should. That brief over-admission
//! under contention is an accepted trade-off; a stricter variant would do
//! a compare-and-swap through the store without changing this contract.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use notegate_common::{GateError, RATE_LIMIT_PREFIX};
use notegate_store::StateStore;

/// Admission budget for one route: `capacity` requests per `window_seconds`
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct RouteLimit {
    pub capacity: u32,
    pub window_seconds: u64,
}

impl Default for RouteLimit {
    fn default() -> Self {
        Self {
            capacity: 5,
            window_seconds: 60,
        }
    }
}

/// Per-route rate limit configuration with a default for unmatched routes.
///
/// Routes are resolved by longest configured prefix, so `/notes/42` draws
/// from the `/notes` bucket when `/notes` is the configured route. An
/// unmatched path gets its own bucket under the default limit.
#[derive(Clone, Debug, Default)]
pub struct RateLimitPolicy {
    routes: Vec<(String, RouteLimit)>,
    default: RouteLimit,
}

impl RateLimitPolicy {
    pub fn new(default: RouteLimit) -> Self {
        Self {
            routes: Vec::new(),
            default,
        }
    }

    pub fn with_route(mut self, route: impl Into<String>, limit: RouteLimit) -> Self {
        self.routes.push((route.into(), limit));
        self
    }

    /// Resolve a request path to its route key and limit.
    pub fn resolve<'a>(&'a self, path: &'a str) -> (&'a str, RouteLimit) {
        let mut best: Option<&(String, RouteLimit)> = None;
        for candidate in &self.routes {
            if path.starts_with(candidate.0.as_str())
                && best.is_none_or(|b| candidate.0.len() > b.0.len())
            {
                best = Some(candidate);
            }
        }
        match best {
            Some((route, limit)) => (route.as_str(), *limit),
            None => (path, self.default),
        }
    }
}

/// Persisted bucket state: remaining tokens and the last refill timestamp
/// in fractional seconds since the UNIX epoch.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
struct BucketState {
    tokens: f64,
    last: f64,
}

impl BucketState {
    fn full(limit: &RouteLimit, now: f64) -> Self {
        Self {
            tokens: limit.capacity as f64,
            last: now,
        }
    }
}

/// Refill `state` up to `now`, clamped to `[0, capacity]`.
fn refill(state: BucketState, limit: &RouteLimit, now: f64) -> f64 {
    let capacity = limit.capacity as f64;
    let elapsed = (now - state.last).max(0.0);
    let replenished = state.tokens + elapsed / limit.window_seconds as f64 * capacity;
    replenished.clamp(0.0, capacity)
}

/// Distributed token-bucket rate limiter over the shared state store
pub struct RateLimiter {
    store: Arc<dyn StateStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn StateStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    /// The route key a path resolves to (used for rejection messages).
    pub fn route_key(&self, path: &str) -> String {
        self.policy.resolve(path).0.to_string()
    }

    /// Check and consume admission budget for one request.
    ///
    /// Returns `Ok(true)` when admitted (one token deducted), `Ok(false)`
    /// when denied (refilled state persisted without deduction). A store
    /// failure surfaces as `StoreUnavailable`; callers decide the
    /// fail-open/fail-closed policy; the admission pipeline fails closed.
    pub async fn admit(&self, user_id: &str, path: &str) -> Result<bool, GateError> {
        let (route_key, limit) = self.policy.resolve(path);
        let key = format!("{RATE_LIMIT_PREFIX}:{user_id}:{route_key}");
        let now = now_seconds();

        let state = match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(key = %key, %err, "Discarding unreadable bucket state");
                BucketState::full(&limit, now)
            }),
            None => BucketState::full(&limit, now),
        };

        let mut tokens = refill(state, &limit, now);
        let admitted = tokens >= 1.0;
        if admitted {
            tokens -= 1.0;
        }

        let next = BucketState { tokens, last: now };
        self.store
            .set(&key, &serde_json::to_string(&next)?, None)
            .await?;

        Ok(admitted)
    }
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    use notegate_store::MemoryStateStore;
    use proptest::prelude::*;

    fn limiter_with(route: &str, capacity: u32, window_seconds: u64) -> (Arc<dyn StateStore>, RateLimiter) {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let policy = RateLimitPolicy::new(RouteLimit::default()).with_route(
            route,
            RouteLimit {
                capacity,
                window_seconds,
            },
        );
        let limiter = RateLimiter::new(store.clone(), policy);
        (store, limiter)
    }

    #[tokio::test]
    async fn test_capacity_exhaustion() {
        let (_, limiter) = limiter_with("/notes", 3, 60);

        for _ in 0..3 {
            assert!(limiter.admit("user-a", "/notes").await.unwrap());
        }
        assert!(!limiter.admit("user-a", "/notes").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_are_per_user_and_route() {
        let (_, limiter) = limiter_with("/notes", 1, 60);

        assert!(limiter.admit("user-a", "/notes").await.unwrap());
        assert!(!limiter.admit("user-a", "/notes").await.unwrap());

        // Another user and another route are unaffected
        assert!(limiter.admit("user-b", "/notes").await.unwrap());
        assert!(limiter.admit("user-a", "/other").await.unwrap());
    }

    #[tokio::test]
    async fn test_refill_after_window() {
        let (store, limiter) = limiter_with("/notes", 2, 60);

        assert!(limiter.admit("user-a", "/notes").await.unwrap());
        assert!(limiter.admit("user-a", "/notes").await.unwrap());
        assert!(!limiter.admit("user-a", "/notes").await.unwrap());

        // Back-date the stored bucket by a full window: tokens refill to
        // capacity (capped), so admission succeeds again.
        let back_dated = serde_json::to_string(&BucketState {
            tokens: 0.0,
            last: now_seconds() - 60.0,
        })
        .unwrap();
        store
            .set("ratelimit:user-a:/notes", &back_dated, None)
            .await
            .unwrap();

        assert!(limiter.admit("user-a", "/notes").await.unwrap());
        assert!(limiter.admit("user-a", "/notes").await.unwrap());
        assert!(!limiter.admit("user-a", "/notes").await.unwrap());
    }

    #[tokio::test]
    async fn test_denied_call_persists_refilled_state() {
        let (store, limiter) = limiter_with("/notes", 1, 60);

        assert!(limiter.admit("user-a", "/notes").await.unwrap());
        assert!(!limiter.admit("user-a", "/notes").await.unwrap());

        let raw = store.get("ratelimit:user-a:/notes").await.unwrap().unwrap();
        let state: BucketState = serde_json::from_str(&raw).unwrap();
        assert!(state.tokens < 1.0);
        assert!(state.tokens >= 0.0);
    }

    #[tokio::test]
    async fn test_corrupt_state_resets_to_full() {
        let (store, limiter) = limiter_with("/notes", 2, 60);

        store
            .set("ratelimit:user-a:/notes", "not json", None)
            .await
            .unwrap();

        assert!(limiter.admit("user-a", "/notes").await.unwrap());
        assert!(limiter.admit("user-a", "/notes").await.unwrap());
        assert!(!limiter.admit("user-a", "/notes").await.unwrap());
    }

    #[test]
    fn test_route_resolution() {
        let policy = RateLimitPolicy::new(RouteLimit::default())
            .with_route(
                "/notes",
                RouteLimit {
                    capacity: 5,
                    window_seconds: 60,
                },
            )
            .with_route(
                "/notes/events",
                RouteLimit {
                    capacity: 2,
                    window_seconds: 10,
                },
            );

        assert_eq!(policy.resolve("/notes").0, "/notes");
        assert_eq!(policy.resolve("/notes/42").0, "/notes");
        // Longest prefix wins
        assert_eq!(policy.resolve("/notes/events").0, "/notes/events");
        // Unconfigured routes fall back to the default limit
        let (route, limit) = policy.resolve("/users");
        assert_eq!(route, "/users");
        assert_eq!(limit.capacity, RouteLimit::default().capacity);
    }

    proptest! {
        // Refill never leaves the [0, capacity] invariant, for any stored
        // token count, any backwards or forwards clock skew.
        #[test]
        fn refill_respects_bucket_bounds(
            tokens in -10.0f64..1000.0,
            skew in -3600.0f64..3600.0,
            capacity in 1u32..100,
            window in 1u64..3600,
        ) {
            let limit = RouteLimit { capacity, window_seconds: window };
            let now = 1_700_000_000.0;
            let state = BucketState { tokens: tokens.clamp(0.0, capacity as f64), last: now - skew };
            let refilled = refill(state, &limit, now);
            prop_assert!(refilled >= 0.0);
            prop_assert!(refilled <= capacity as f64);
        }
    }
}
