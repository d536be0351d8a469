// In-memory state store
// Single-process implementation of the StateStore substrate with TTL
// expiry and per-channel broadcast pub/sub

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use notegate_common::GateError;

use crate::StateStore;

/// Buffered payloads per pub/sub channel before slow subscribers lag
const CHANNEL_CAPACITY: usize = 256;

/// Sweep interval for the background expiry task
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// A stored value with optional expiry
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory `StateStore` backed by DashMap, with a background sweeper for
/// expired entries and one broadcast channel per pub/sub channel name.
///
/// Expiry is enforced lazily on every read path as well, so correctness
/// never depends on the sweeper having run.
pub struct MemoryStateStore {
    entries: Arc<DashMap<String, Entry>>,
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStateStore {
    /// Create a new store and start the background expiry sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let entries: Arc<DashMap<String, Entry>> = Arc::new(DashMap::new());

        let sweeper_entries = entries.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let before = sweeper_entries.len();
                sweeper_entries.retain(|_, entry| !entry.is_expired());
                let removed = before.saturating_sub(sweeper_entries.len());
                if removed > 0 {
                    debug!(count = removed, "Swept expired store entries");
                }
            }
        });

        Self {
            entries,
            channels: DashMap::new(),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, GateError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), GateError> {
        self.entries
            .insert(key.to_string(), Entry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, GateError> {
        Ok(self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired())
            .is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, GateError> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in &keys {
            if self.entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn incr(&self, key: &str) -> Result<i64, GateError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new("0".to_string(), None));
        if entry.is_expired() {
            *entry = Entry::new("0".to_string(), None);
        }
        let current: i64 = entry.value.parse().unwrap_or(0);
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, GateError> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_expired() {
                return Ok(false);
            }
            entry.expires_at = Some(Instant::now() + ttl);
            return Ok(true);
        }
        Ok(false)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, GateError> {
        let mut inserted = false;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            inserted = true;
            Entry::new(value.to_string(), Some(ttl))
        });
        // An expired holdover counts as absent
        if !inserted && entry.is_expired() {
            *entry = Entry::new(value.to_string(), Some(ttl));
            inserted = true;
        }
        Ok(inserted)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, GateError> {
        Ok(self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired() && entry.value == value)
            .is_some())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, GateError> {
        // A send with no receivers is not an error: publishing to a channel
        // with zero subscribers succeeds and has no observable effect.
        Ok(self
            .sender(channel)
            .send(payload.to_string())
            .unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>, GateError> {
        Ok(self.sender(channel).subscribe())
    }
}
