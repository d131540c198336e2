use super::SmsService;
use crate::config::FailurePolicy;
use crate::errors::{ServiceError, ServiceResult};
use crate::ratelimit::Limiter;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

/// Caps the rate at which messages reach the wrapped provider.
pub struct RateLimitedSender {
    inner: Arc<dyn SmsService>,
    limiter: Arc<dyn Limiter>,
    key: String,
    on_store_error: FailurePolicy,
}

impl RateLimitedSender {
    /// `provider` names the limiter window, e.g. `sms:gateway`.
    pub fn new(
        inner: Arc<dyn SmsService>,
        limiter: Arc<dyn Limiter>,
        provider: &str,
        on_store_error: FailurePolicy,
    ) -> Self {
        Self {
            inner,
            limiter,
            key: format!("sms:{provider}"),
            on_store_error,
        }
    }
}

#[async_trait]
impl SmsService for RateLimitedSender {
    async fn send(
        &self,
        template_id: &str,
        args: &[String],
        numbers: &[String],
    ) -> ServiceResult<()> {
        match self.limiter.limit(&self.key).await {
            Ok(false) => {}
            Ok(true) => {
                warn!("SMS rate limit reached for {}", self.key);
                return Err(ServiceError::RateLimited);
            }
            Err(e) => {
                error!("SMS limiter unavailable for {}: {}", self.key, e);
                if self.on_store_error == FailurePolicy::Closed {
                    return Err(e.into());
                }
            }
        }
        self.inner.send(template_id, args, numbers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::SlidingWindowLimiter;
    use crate::services::sms::memory::MemorySender;
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use std::time::Duration;

    struct BrokenLimiter;

    #[async_trait]
    impl Limiter for BrokenLimiter {
        async fn limit(&self, _key: &str) -> StoreResult<bool> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
    }

    fn send_args() -> (Vec<String>, Vec<String>) {
        (vec!["123456".to_string()], vec!["13800138000".to_string()])
    }

    #[tokio::test]
    async fn test_rejects_over_quota() {
        let inner = Arc::new(MemorySender::new());
        let limiter = SlidingWindowLimiter::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(60),
            1,
        );
        let sender =
            RateLimitedSender::new(inner.clone(), Arc::new(limiter), "test", FailurePolicy::Closed);
        let (a, n) = send_args();

        sender.send("tpl", &a, &n).await.unwrap();
        let err = sender.send("tpl", &a, &n).await.unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited));
        assert_eq!(inner.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_limiter_failure_follows_policy() {
        let (a, n) = send_args();

        let inner = Arc::new(MemorySender::new());
        let closed = RateLimitedSender::new(
            inner.clone(),
            Arc::new(BrokenLimiter),
            "test",
            FailurePolicy::Closed,
        );
        let err = closed.send("tpl", &a, &n).await.unwrap_err();
        assert!(matches!(err, ServiceError::StoreUnavailable { .. }));
        assert!(inner.sent().is_empty());

        let open = RateLimitedSender::new(
            inner.clone(),
            Arc::new(BrokenLimiter),
            "test",
            FailurePolicy::Open,
        );
        open.send("tpl", &a, &n).await.unwrap();
        assert_eq!(inner.sent().len(), 1);
    }
}
