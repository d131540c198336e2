//! In-process sender for local runs and tests.

use super::{SmsService, mask_recipient};
use crate::errors::ServiceResult;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

/// One message accepted by [`MemorySender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub template_id: String,
    pub args: Vec<String>,
    pub numbers: Vec<String>,
}

/// Records messages instead of delivering them.
#[derive(Default)]
pub struct MemorySender {
    sent: Mutex<Vec<SentMessage>>,
}

impl MemorySender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far, oldest first.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SmsService for MemorySender {
    async fn send(
        &self,
        template_id: &str,
        args: &[String],
        numbers: &[String],
    ) -> ServiceResult<()> {
        let masked: Vec<String> = numbers.iter().map(|n| mask_recipient(n)).collect();
        info!(
            "Recorded message with template {} for {:?}",
            template_id, masked
        );

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                template_id: template_id.to_string(),
                args: args.to_vec(),
                numbers: numbers.to_vec(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_messages() {
        let sender = MemorySender::new();
        sender
            .send("1877556", &["123456".to_string()], &["13800138000".to_string()])
            .await
            .unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template_id, "1877556");
        assert_eq!(sent[0].args, vec!["123456".to_string()]);
    }
}
