//! Read-through response cache
//!
//! Memoizes query results in the shared state store under fingerprint
//! keys. Values are JSON; `chrono` timestamps serialize as RFC 3339 so
//! structured times round-trip losslessly.
//!
//! Caching is an optimization, never a correctness requirement: a store
//! failure on the read path degrades to a miss and the caller falls
//! through to the record store, and a failed invalidation is logged
//! without failing the write; the entry's TTL bounds the resulting
//! staleness. Prefix invalidation scans and deletes non-atomically; a
//! read racing between the two may briefly observe a stale list.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use notegate_store::StateStore;

/// TTL'd JSON cache over the shared state store
pub struct CacheManager {
    store: Arc<dyn StateStore>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Look up a cached value. Store failures and undecodable entries are
    /// reported as misses.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    counter!("cache_hits_total").increment(1);
                    Some(value)
                }
                Err(err) => {
                    warn!(key = %key, %err, "Discarding undecodable cache entry");
                    counter!("cache_misses_total").increment(1);
                    None
                }
            },
            Ok(None) => {
                counter!("cache_misses_total").increment(1);
                None
            }
            Err(err) => {
                // Degrade to a miss; the caller reads the record store
                warn!(key = %key, %err, "Cache read degraded to miss");
                counter!("cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Store a value under `key` for `ttl`.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key = %key, %err, "Skipping cache fill for unserializable value");
                return;
            }
        };
        if let Err(err) = self.store.set(key, &raw, Some(ttl)).await {
            warn!(key = %key, %err, "Cache fill failed");
        }
    }

    /// Invalidate a single entry.
    pub async fn delete(&self, key: &str) {
        if let Err(err) = self.store.delete(key).await {
            warn!(key = %key, %err, "Cache invalidation failed; TTL bounds staleness");
        }
    }

    /// Invalidate every entry under `prefix` (bulk invalidation scoped to
    /// one owner's fingerprints).
    pub async fn delete_prefix(&self, prefix: &str) {
        match self.store.delete_prefix(prefix).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!(prefix = %prefix, count = removed, "Invalidated cache entries");
                }
            }
            Err(err) => {
                warn!(prefix = %prefix, %err, "Cache invalidation failed; TTL bounds staleness");
            }
        }
    }
}
