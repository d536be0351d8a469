//! Notification broadcaster
//!
//! Publishes domain events through the shared state store and fans them
//! out to the live subscribers connected to *this* process. Every process
//! in a horizontally scaled deployment runs its own relay on the shared
//! channel, so an event published anywhere reaches subscribers everywhere.
//!
//! Delivery is best-effort and only to currently connected subscribers:
//! a subscriber that disconnects mid-delivery is dropped silently, a
//! subscriber whose queue is full loses that event, and nothing is
//! replayed to late subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::Stream;
use metrics::counter;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use notegate_common::GateError;
use notegate_store::StateStore;

/// Queued events per subscriber before delivery drops for that subscriber
const SUBSCRIBER_QUEUE: usize = 64;

/// A live local subscriber: its channel and the sender feeding it
struct LocalSubscriber {
    channel: String,
    tx: mpsc::Sender<String>,
}

/// Event publisher and per-process fan-out.
///
/// The subscriber registry is an explicit concurrent map mutated by
/// subscribe/unsubscribe and iterated by the relay tasks; removal is
/// collected during iteration and applied after it, never mid-iteration.
pub struct NotificationBroadcaster {
    store: Arc<dyn StateStore>,
    subscribers: Arc<DashMap<u64, LocalSubscriber>>,
    relays: Mutex<HashMap<String, JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl NotificationBroadcaster {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            subscribers: Arc::new(DashMap::new()),
            relays: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Publish an event payload to `channel`.
    ///
    /// Succeeds with zero subscribers; returns the number of processes the
    /// store handed the payload to.
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<usize, GateError> {
        let receivers = self.store.publish(channel, payload).await?;
        counter!("events_published_total").increment(1);
        Ok(receivers)
    }

    /// Register a live subscriber on `channel`.
    ///
    /// The returned [`Subscription`] yields payloads in publish order
    /// relative to a single publisher. Dropping it deregisters promptly.
    pub async fn subscribe(&self, channel: &str) -> Result<Subscription, GateError> {
        self.ensure_relay(channel).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(
            id,
            LocalSubscriber {
                channel: channel.to_string(),
                tx,
            },
        );
        debug!(channel = %channel, id, "Subscriber registered");

        Ok(Subscription {
            id,
            rx,
            subscribers: self.subscribers.clone(),
        })
    }

    /// Deregister a subscriber by id (the usual path is dropping the
    /// [`Subscription`]).
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.remove(&id);
    }

    /// Number of live local subscribers (all channels).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Abort the relay tasks. Pending subscriptions stop receiving.
    pub async fn shutdown(&self) {
        let mut relays = self.relays.lock().await;
        for (channel, handle) in relays.drain() {
            handle.abort();
            debug!(channel = %channel, "Relay stopped");
        }
    }

    /// Spawn the relay for `channel` if this process has none yet.
    ///
    /// The relay blocks on the store subscription (no polling interval to
    /// tune, no busy spin) and ends when the store side closes or the
    /// broadcaster shuts down.
    async fn ensure_relay(&self, channel: &str) -> Result<(), GateError> {
        let mut relays = self.relays.lock().await;
        if relays.contains_key(channel) {
            return Ok(());
        }

        let mut rx = self.store.subscribe(channel).await?;
        let subscribers = self.subscribers.clone();
        let channel_name = channel.to_string();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => {
                        let mut closed: Vec<u64> = Vec::new();
                        for entry in subscribers.iter() {
                            if entry.value().channel != channel_name {
                                continue;
                            }
                            match entry.value().tx.try_send(payload.clone()) {
                                Ok(()) => {
                                    counter!("events_delivered_total").increment(1);
                                }
                                Err(TrySendError::Full(_)) => {
                                    // Best-effort: the slow subscriber loses this event
                                    debug!(id = entry.key(), "Subscriber queue full, event dropped");
                                }
                                Err(TrySendError::Closed(_)) => {
                                    closed.push(*entry.key());
                                }
                            }
                        }
                        for id in closed {
                            subscribers.remove(&id);
                            debug!(id, "Disconnected subscriber removed");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(channel = %channel_name, skipped, "Relay lagged behind the store channel");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        relays.insert(channel.to_string(), handle);
        Ok(())
    }
}

/// A live subscription handle.
///
/// Yields payloads via [`recv`](Self::recv) or as a `Stream`; dropping it
/// removes the subscriber from the registry, and the relay additionally
/// prunes closed subscribers as a backstop.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<String>,
    subscribers: Arc<DashMap<u64, LocalSubscriber>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next payload; `None` once the relay is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = String;

    fn poll_next(self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use notegate_store::MemoryStateStore;
    use tokio::time::timeout;

    fn broadcaster() -> NotificationBroadcaster {
        NotificationBroadcaster::new(Arc::new(MemoryStateStore::new()))
    }

    async fn next(sub: &mut Subscription) -> String {
        timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timed out waiting for event")
            .expect("subscription closed")
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let broadcaster = broadcaster();
        // No observable effect, no error
        broadcaster.publish("notes", "e1").await.unwrap();
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_fan_out_in_publish_order() {
        let broadcaster = broadcaster();

        let mut sub_a = broadcaster.subscribe("notes").await.unwrap();
        let mut sub_b = broadcaster.subscribe("notes").await.unwrap();

        broadcaster.publish("notes", "e1").await.unwrap();
        broadcaster.publish("notes", "e2").await.unwrap();
        broadcaster.publish("notes", "e3").await.unwrap();

        for expected in ["e1", "e2", "e3"] {
            assert_eq!(next(&mut sub_a).await, expected);
        }
        for expected in ["e1", "e2", "e3"] {
            assert_eq!(next(&mut sub_b).await, expected);
        }
    }

    #[tokio::test]
    async fn test_no_replay_to_late_subscribers() {
        let broadcaster = broadcaster();

        let mut early = broadcaster.subscribe("notes").await.unwrap();
        broadcaster.publish("notes", "e1").await.unwrap();
        assert_eq!(next(&mut early).await, "e1");

        let mut late = broadcaster.subscribe("notes").await.unwrap();
        broadcaster.publish("notes", "e2").await.unwrap();

        // The late subscriber sees only what was published after it joined
        assert_eq!(next(&mut late).await, "e2");
        assert_eq!(next(&mut early).await, "e2");
    }

    #[tokio::test]
    async fn test_drop_deregisters() {
        let broadcaster = broadcaster();

        let sub = broadcaster.subscribe("notes").await.unwrap();
        assert_eq!(broadcaster.subscriber_count(), 1);
        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 0);

        // Publishing after the disconnect is still fine
        broadcaster.publish("notes", "e1").await.unwrap();
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let broadcaster = broadcaster();

        let mut notes = broadcaster.subscribe("notes").await.unwrap();
        let mut other = broadcaster.subscribe("audit").await.unwrap();

        broadcaster.publish("notes", "n1").await.unwrap();
        broadcaster.publish("audit", "a1").await.unwrap();

        assert_eq!(next(&mut notes).await, "n1");
        assert_eq!(next(&mut other).await, "a1");
    }
}
