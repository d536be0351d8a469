//! Daily write quota enforcement
//!
//! Counts write operations per user per calendar day. The day key is
//! computed in UTC; counters auto-expire 24 hours after creation so an
//! exhausted budget never outlives its day by more than the store sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};

use notegate_common::{GateError, QUOTA_PREFIX};
use notegate_store::StateStore;

/// Counter lifetime; refreshing it on every consume is idempotent for a
/// fixed duration and keeps the expiry logic branch-free.
const QUOTA_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-user calendar-day write budget over the shared state store.
///
/// Reference timezone is UTC.
pub struct QuotaEnforcer {
    store: Arc<dyn StateStore>,
    daily_limit: u32,
}

impl QuotaEnforcer {
    pub fn new(store: Arc<dyn StateStore>, daily_limit: u32) -> Self {
        Self { store, daily_limit }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Consume one unit of today's write budget.
    ///
    /// Returns `Ok(false)` without mutating anything once the budget is
    /// exhausted; otherwise increments and returns `Ok(true)`.
    pub async fn consume(&self, user_id: &str) -> Result<bool, GateError> {
        self.consume_on(user_id, Utc::now().date_naive()).await
    }

    /// Date-parameterised form of [`consume`](Self::consume); the rollover
    /// property is tested through this without waiting for midnight.
    pub(crate) async fn consume_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<bool, GateError> {
        let key = format!("{QUOTA_PREFIX}:{user_id}:{}", date.format("%Y-%m-%d"));

        let count = self
            .store
            .get(&key)
            .await?
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(0);
        if count >= self.daily_limit {
            return Ok(false);
        }

        self.store.incr(&key).await?;
        self.store.expire(&key, QUOTA_WINDOW).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use notegate_store::MemoryStateStore;

    fn enforcer(limit: u32) -> QuotaEnforcer {
        QuotaEnforcer::new(Arc::new(MemoryStateStore::new()), limit)
    }

    #[tokio::test]
    async fn test_quota_exhaustion() {
        let quota = enforcer(3);
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        for _ in 0..3 {
            assert!(quota.consume_on("user-a", day).await.unwrap());
        }
        assert!(!quota.consume_on("user-a", day).await.unwrap());
        // Denied calls do not mutate: still denied, still day-scoped
        assert!(!quota.consume_on("user-a", day).await.unwrap());
    }

    #[tokio::test]
    async fn test_quota_is_per_user() {
        let quota = enforcer(1);
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        assert!(quota.consume_on("user-a", day).await.unwrap());
        assert!(!quota.consume_on("user-a", day).await.unwrap());
        assert!(quota.consume_on("user-b", day).await.unwrap());
    }

    #[tokio::test]
    async fn test_next_day_resets() {
        let quota = enforcer(2);
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let next = day.succ_opt().unwrap();

        assert!(quota.consume_on("user-a", day).await.unwrap());
        assert!(quota.consume_on("user-a", day).await.unwrap());
        assert!(!quota.consume_on("user-a", day).await.unwrap());

        // The following day succeeds regardless of prior exhaustion
        assert!(quota.consume_on("user-a", next).await.unwrap());
    }
}
