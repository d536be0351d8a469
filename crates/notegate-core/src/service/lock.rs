//! Store-backed mutation lock
//!
//! Short-lived mutual exclusion around entity edits. Acquisition is a
//! conditional set of `lock:{resource}` to a unique holder token with a
//! TTL; it either succeeds immediately or fails immediately. There is no
//! blocking wait, so request latency stays bounded and the caller maps a
//! failed acquire to `ResourceBusy`.
//!
//! Release only deletes the key while it still holds the caller's token,
//! so a slow holder whose TTL lapsed cannot delete a lock a later holder
//! has since acquired. The TTL is a safety net for crashed holders, not
//! the primary release path; it must exceed the expected critical-section
//! duration.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use notegate_common::{GateError, LOCK_PREFIX};
use notegate_store::StateStore;

/// Mutual-exclusion service over the shared state store
pub struct MutationLock {
    store: Arc<dyn StateStore>,
    ttl: Duration,
}

impl MutationLock {
    pub fn new(store: Arc<dyn StateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Try to acquire the lock for `resource_key`.
    ///
    /// Returns `Ok(None)` when another holder owns a live lock.
    pub async fn acquire(&self, resource_key: &str) -> Result<Option<LockGuard>, GateError> {
        let key = format!("{LOCK_PREFIX}:{resource_key}");
        let token = Uuid::new_v4().to_string();

        if self.store.set_if_absent(&key, &token, self.ttl).await? {
            debug!(key = %key, "Lock acquired");
            Ok(Some(LockGuard {
                store: self.store.clone(),
                key,
                token,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Run `f` under the lock for `resource_key`, releasing on every exit
    /// path (success, handler error, cancellation via the guard's Drop).
    ///
    /// Fails with `ResourceBusy` instead of waiting when the lock is held.
    pub async fn with_lock<T, F, Fut>(&self, resource_key: &str, f: F) -> Result<T, GateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GateError>>,
    {
        let Some(guard) = self.acquire(resource_key).await? else {
            return Err(GateError::ResourceBusy(resource_key.to_string()));
        };

        let result = f().await;
        guard.release().await;
        result
    }
}

/// An acquired lock. Dropping an unreleased guard schedules the guarded
/// delete on the runtime, so cancelled request tasks do not leave the
/// resource blocked until TTL expiry.
pub struct LockGuard {
    store: Arc<dyn StateStore>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    /// Release the lock, deleting the key only if this guard's token is
    /// still the stored holder. Returns whether the delete happened.
    pub async fn release(mut self) -> bool {
        self.released = true;
        match self.store.delete_if_equals(&self.key, &self.token).await {
            Ok(true) => {
                debug!(key = %self.key, "Lock released");
                true
            }
            Ok(false) => {
                // TTL lapsed and someone else holds the key now
                warn!(key = %self.key, "Lock expired before release");
                false
            }
            Err(err) => {
                warn!(key = %self.key, %err, "Lock release failed; TTL will reclaim it");
                false
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = store.delete_if_equals(&key, &token).await {
                    debug!(key = %key, %err, "Best-effort lock release failed");
                }
            });
        }
    }
}
