//! Notegate Core - the request-admission and consistency services
//!
//! Every service in this crate coordinates exclusively through the shared
//! [`StateStore`](notegate_store::StateStore) handle it is constructed
//! with:
//!
//! - [`RateLimiter`]: continuous token bucket per (user, route)
//! - [`QuotaEnforcer`]: per-user calendar-day write budget
//! - [`MutationLock`]: short-lived mutual exclusion for entity edits
//! - [`CacheManager`]: TTL'd read-through cache for query results
//! - [`NotificationBroadcaster`]: event publish and live fan-out

pub mod service;

pub use service::broadcast::{NotificationBroadcaster, Subscription};
pub use service::cache::CacheManager;
pub use service::lock::{LockGuard, MutationLock};
pub use service::quota::QuotaEnforcer;
pub use service::rate_limit::{RateLimitPolicy, RateLimiter, RouteLimit};
