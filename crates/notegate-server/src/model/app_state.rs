//! Application state shared across all handlers
//!
//! The state store handle and every service built on it are constructed
//! once at startup and live here; handlers reach them through
//! `web::Data<AppState>`. The pipeline itself owns no request state; it
//! is a pure coordinator over the store.

use std::sync::Arc;

use notegate_core::{
    CacheManager, MutationLock, NotificationBroadcaster, QuotaEnforcer, RateLimiter,
};
use notegate_store::StateStore;

use crate::record::RecordStore;

use super::config::Configuration;

/// Shared application state
pub struct AppState {
    pub configuration: Configuration,
    /// The shared mutable substrate all coordination goes through
    pub state_store: Arc<dyn StateStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub quota: Arc<QuotaEnforcer>,
    pub mutation_lock: Arc<MutationLock>,
    pub cache: Arc<CacheManager>,
    pub broadcaster: Arc<NotificationBroadcaster>,
    /// Record-store collaborator the wrapped handlers read and write
    pub records: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn new(
        configuration: Configuration,
        state_store: Arc<dyn StateStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            state_store.clone(),
            configuration.rate_limit_policy(),
        ));
        let quota = Arc::new(QuotaEnforcer::new(
            state_store.clone(),
            configuration.daily_write_quota(),
        ));
        let mutation_lock = Arc::new(MutationLock::new(
            state_store.clone(),
            configuration.lock_ttl(),
        ));
        let cache = Arc::new(CacheManager::new(state_store.clone()));
        let broadcaster = Arc::new(NotificationBroadcaster::new(state_store.clone()));

        Self {
            configuration,
            state_store,
            rate_limiter,
            quota,
            mutation_lock,
            cache,
            broadcaster,
            records,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("configuration", &self.configuration)
            .field("state_store", &"<dyn StateStore>")
            .field("records", &"<dyn RecordStore>")
            .finish()
    }
}
