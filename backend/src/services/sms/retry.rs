use super::SmsService;
use crate::errors::ServiceResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Retries a failed send up to `max_attempts` calls in total.
pub struct RetrySender {
    inner: Arc<dyn SmsService>,
    max_attempts: u32,
}

impl RetrySender {
    pub fn new(inner: Arc<dyn SmsService>, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
        }
    }
}

#[async_trait]
impl SmsService for RetrySender {
    async fn send(
        &self,
        template_id: &str,
        args: &[String],
        numbers: &[String],
    ) -> ServiceResult<()> {
        let mut attempt = 1;
        loop {
            match self.inner.send(template_id, args, numbers).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_attempts => {
                    warn!("SMS send attempt {} failed: {}", attempt, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
