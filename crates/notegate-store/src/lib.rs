//! Notegate Store - the shared state substrate
//!
//! Every cross-request coordination primitive in Notegate (rate limiting,
//! quotas, mutation locks, the response cache, event fan-out) goes through
//! the [`StateStore`] trait defined here. The store is the *only* shared
//! mutable substrate; request handlers never coordinate through in-process
//! memory directly.
//!
//! The store handle is constructed explicitly at process startup and passed
//! into each component as `Arc<dyn StateStore>`; there is no process-wide
//! singleton client.

pub mod memory;

use std::time::Duration;

use tokio::sync::broadcast;

use notegate_common::GateError;

/// Abstract key/value store with TTL support, atomic increment, conditional
/// writes and publish/subscribe.
///
/// All operations are fallible with [`GateError::StoreUnavailable`] so that
/// callers can apply their own degradation policy (admission checks fail
/// closed, cache reads fall through).
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// Read a value. Expired entries are reported as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, GateError>;

    /// Write a value, optionally with a time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), GateError>;

    /// Delete a key. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, GateError>;

    /// Delete every key starting with `prefix`. Returns the number removed.
    ///
    /// The scan and the deletes are not atomic with respect to concurrent
    /// readers; callers accept bounded staleness here.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, GateError>;

    /// Atomically increment the integer value at `key`, creating it at 1.
    async fn incr(&self, key: &str) -> Result<i64, GateError>;

    /// Set the TTL of an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, GateError>;

    /// Conditionally set `key` to `value` with a TTL, succeeding only if the
    /// key is absent or expired. Returns whether the write happened.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, GateError>;

    /// Delete `key` only if its current value equals `value`. Returns
    /// whether the delete happened.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, GateError>;

    /// Publish a payload to a channel. Returns the number of live
    /// subscribers the payload was handed to.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, GateError>;

    /// Subscribe to a channel. Only payloads published after this call are
    /// received.
    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>, GateError>;
}

pub use memory::MemoryStateStore;
