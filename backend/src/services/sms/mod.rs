//! Notification channel used to deliver verification codes.
//!
//! Concrete senders (`memory`, `email`, `webhook`) implement [`SmsService`];
//! the decorators (`failover`, `retry`, `ratelimit`) wrap any other
//! [`SmsService`] and are stacked in `main`.

use crate::errors::ServiceResult;
use async_trait::async_trait;

pub mod email;
pub mod failover;
pub mod memory;
pub mod ratelimit;
pub mod retry;
pub mod webhook;

/// Delivers a templated message to one or more recipients.
#[async_trait]
pub trait SmsService: Send + Sync {
    async fn send(&self, template_id: &str, args: &[String], numbers: &[String])
    -> ServiceResult<()>;
}

/// Hides all but the last four characters of a phone number or address.
pub fn mask_recipient(recipient: &str) -> String {
    let chars: Vec<char> = recipient.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_recipient() {
        assert_eq!(mask_recipient("13800138000"), "*******8000");
        assert_eq!(mask_recipient("123"), "***");
    }
}
