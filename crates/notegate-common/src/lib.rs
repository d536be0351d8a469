//! Notegate Common - shared error types and constants
//!
//! This crate provides the foundational types used across all Notegate
//! components: the admission-layer error taxonomy, structured error codes
//! for API responses, and the key-prefix constants every store-backed
//! component agrees on.

pub mod error;

// Re-exports for convenience
pub use error::{ErrorCode, GateError};

/// Key prefix for token-bucket rate limit state: `ratelimit:{user}:{route}`
pub const RATE_LIMIT_PREFIX: &str = "ratelimit";

/// Key prefix for daily quota counters: `quota:{user}:{YYYY-MM-DD}`
pub const QUOTA_PREFIX: &str = "quota";

/// Key prefix for mutation locks: `lock:{resource}`
pub const LOCK_PREFIX: &str = "lock";

/// Key prefix for cached query results: `cache:{fingerprint}`
pub const CACHE_PREFIX: &str = "cache";

/// Default pub/sub channel for note lifecycle events
pub const NOTES_CHANNEL: &str = "notes";
