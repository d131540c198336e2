//! Sliding-window rate limiting on top of the shared store.
//!
//! The limiter only answers "is this key over quota". What to do when the
//! store cannot answer is left to the caller (see [`FailurePolicy`]).
//!
//! [`FailurePolicy`]: crate::config::FailurePolicy

use crate::config::RateLimitConfig;
use crate::store::{AtomicKeyStore, StoreResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod middleware;

/// Decides whether the action identified by `key` is over quota.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Returns `true` when the call must be rejected.
    async fn limit(&self, key: &str) -> StoreResult<bool>;
}

/// At most `rate` calls per key within any trailing `interval`.
pub struct SlidingWindowLimiter {
    store: Arc<dyn AtomicKeyStore>,
    interval: Duration,
    rate: u32,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn AtomicKeyStore>, interval: Duration, rate: u32) -> Self {
        Self {
            store,
            interval,
            rate,
        }
    }

    pub fn from_config(store: Arc<dyn AtomicKeyStore>, config: &RateLimitConfig) -> Self {
        Self::new(store, config.interval, config.rate)
    }
}

#[async_trait]
impl Limiter for SlidingWindowLimiter {
    async fn limit(&self, key: &str) -> StoreResult<bool> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.store
            .slide_window(key, self.interval, self.rate, now_ms)
            .await
    }
}
