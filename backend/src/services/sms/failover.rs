//! Provider failover.
//!
//! [`FailoverSender`] tries every provider in turn, starting one further
//! along on each call so load spreads across them. [`TimeoutFailoverSender`]
//! sticks to one provider and only moves on after a run of timeouts.

use super::SmsService;
use crate::errors::{ServiceError, ServiceResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::warn;

pub struct FailoverSender {
    providers: Vec<Arc<dyn SmsService>>,
    next: AtomicUsize,
}

impl FailoverSender {
    pub fn new(providers: Vec<Arc<dyn SmsService>>) -> Self {
        Self {
            providers,
            next: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SmsService for FailoverSender {
    async fn send(
        &self,
        template_id: &str,
        args: &[String],
        numbers: &[String],
    ) -> ServiceResult<()> {
        let len = self.providers.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        for offset in 0..len {
            let idx = (start + offset) % len;
            match self.providers[idx].send(template_id, args, numbers).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!("SMS provider {} failed: {}", idx, e),
            }
        }
        Err(ServiceError::notification("all SMS providers failed"))
    }
}

pub struct TimeoutFailoverSender {
    providers: Vec<Arc<dyn SmsService>>,
    current: AtomicUsize,
    /// Consecutive timeouts of the current provider.
    timeouts: AtomicU32,
    threshold: u32,
    call_timeout: Duration,
}

impl TimeoutFailoverSender {
    pub fn new(providers: Vec<Arc<dyn SmsService>>, threshold: u32, call_timeout: Duration) -> Self {
        Self {
            providers,
            current: AtomicUsize::new(0),
            timeouts: AtomicU32::new(0),
            threshold,
            call_timeout,
        }
    }
}

#[async_trait]
impl SmsService for TimeoutFailoverSender {
    async fn send(
        &self,
        template_id: &str,
        args: &[String],
        numbers: &[String],
    ) -> ServiceResult<()> {
        if self.providers.is_empty() {
            return Err(ServiceError::notification("no SMS providers configured"));
        }

        let mut idx = self.current.load(Ordering::SeqCst);
        if self.timeouts.load(Ordering::SeqCst) >= self.threshold {
            let next = (idx + 1) % self.providers.len();
            // Losing the race means another call already switched.
            if self
                .current
                .compare_exchange(idx, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.timeouts.store(0, Ordering::SeqCst);
                warn!("Switching SMS provider {} -> {} after timeouts", idx, next);
            }
            idx = self.current.load(Ordering::SeqCst);
        }

        let call = self.providers[idx].send(template_id, args, numbers);
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(())) => {
                self.timeouts.store(0, Ordering::SeqCst);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                self.timeouts.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::notification(format!(
                    "SMS provider {idx} timed out"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sms::testing::FlakySender;

    fn args() -> (Vec<String>, Vec<String>) {
        (vec!["123456".to_string()], vec!["13800138000".to_string()])
    }

    #[tokio::test]
    async fn test_failover_moves_to_next_provider() {
        let down = Arc::new(FlakySender::failing(usize::MAX));
        let up = Arc::new(FlakySender::failing(0));
        let sender = FailoverSender::new(vec![down.clone(), up.clone()]);
        let (a, n) = args();

        sender.send("tpl", &a, &n).await.unwrap();
        sender.send("tpl", &a, &n).await.unwrap();
        assert_eq!(up.calls(), 2);
        // First call starts at the broken provider, second starts at the healthy one.
        assert_eq!(down.calls(), 1);
    }

    #[tokio::test]
    async fn test_failover_reports_when_all_fail() {
        let sender = FailoverSender::new(vec![
            Arc::new(FlakySender::failing(usize::MAX)),
            Arc::new(FlakySender::failing(usize::MAX)),
        ]);
        let (a, n) = args();
        let err = sender.send("tpl", &a, &n).await.unwrap_err();
        assert!(matches!(err, ServiceError::Notification { .. }));
    }

    #[tokio::test]
    async fn test_timeout_failover_switches_after_threshold() {
        let slow = Arc::new(FlakySender::slow(Duration::from_millis(200)));
        let fast = Arc::new(FlakySender::failing(0));
        let sender = TimeoutFailoverSender::new(
            vec![slow.clone(), fast.clone()],
            2,
            Duration::from_millis(30),
        );
        let (a, n) = args();

        assert!(sender.send("tpl", &a, &n).await.is_err());
        assert!(sender.send("tpl", &a, &n).await.is_err());
        assert_eq!(fast.calls(), 0);

        sender.send("tpl", &a, &n).await.unwrap();
        sender.send("tpl", &a, &n).await.unwrap();
        assert_eq!(slow.calls(), 2);
        assert_eq!(fast.calls(), 2);
    }

    #[tokio::test]
    async fn test_timeout_failover_keeps_provider_on_other_errors() {
        let flaky = Arc::new(FlakySender::failing(3));
        let other = Arc::new(FlakySender::failing(0));
        let sender = TimeoutFailoverSender::new(
            vec![flaky.clone(), other.clone()],
            1,
            Duration::from_secs(1),
        );
        let (a, n) = args();

        for _ in 0..3 {
            assert!(sender.send("tpl", &a, &n).await.is_err());
        }
        sender.send("tpl", &a, &n).await.unwrap();
        assert_eq!(other.calls(), 0);
    }
}
