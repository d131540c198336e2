//! One-time verification codes.
//!
//! A code lives in the shared store under `phone_code:<biz>:<recipient>`
//! together with its attempt counter, so issuance and verification are each
//! a single atomic store call.

use crate::config::{CodeConfig, DispatchMode};
use crate::errors::{ServiceError, ServiceResult};
use crate::services::sms::{SmsService, mask_recipient};
use crate::store::{AtomicKeyStore, CodePolicy, SetCodeOutcome, VerifyCodeOutcome};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct CodeService {
    store: Arc<dyn AtomicKeyStore>,
    sms: Arc<dyn SmsService>,
    config: CodeConfig,
}

fn code_key(biz: &str, recipient: &str) -> String {
    format!("phone_code:{biz}:{recipient}")
}

fn generate_code() -> String {
    let num: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{num:06}")
}

impl CodeService {
    pub fn new(store: Arc<dyn AtomicKeyStore>, sms: Arc<dyn SmsService>, config: CodeConfig) -> Self {
        Self { store, sms, config }
    }

    fn policy(&self) -> CodePolicy {
        CodePolicy {
            ttl: self.config.ttl,
            resend_cooldown: self.config.resend_cooldown,
            max_attempts: self.config.max_attempts,
        }
    }

    /// Issues a fresh code for `recipient` and hands it to the notification channel.
    ///
    /// A failed dispatch leaves the stored code in place; the recipient can
    /// ask again once the cooldown has passed.
    pub async fn send(&self, biz: &str, recipient: &str) -> ServiceResult<()> {
        let code = generate_code();
        let key = code_key(biz, recipient);

        match self.store.set_code(&key, &code, self.policy()).await? {
            SetCodeOutcome::Created => {}
            SetCodeOutcome::Cooldown => {
                debug!("Code for {} requested within cooldown", mask_recipient(recipient));
                return Err(ServiceError::CodeCooldown);
            }
        }

        let template_id = self.config.template_id.clone();
        let args = vec![code];
        let numbers = vec![recipient.to_string()];

        match self.config.dispatch {
            DispatchMode::Detached => {
                let sms = Arc::clone(&self.sms);
                let masked = mask_recipient(recipient);
                tokio::spawn(async move {
                    match sms.send(&template_id, &args, &numbers).await {
                        Ok(()) => info!("Verification code dispatched to {}", masked),
                        Err(e) => error!("Verification code dispatch to {} failed: {}", masked, e),
                    }
                });
                Ok(())
            }
            DispatchMode::Awaited => {
                self.sms
                    .send(&template_id, &args, &numbers)
                    .await
                    .map_err(|e| {
                        error!(
                            "Verification code dispatch to {} failed: {}",
                            mask_recipient(recipient),
                            e
                        );
                        match e {
                            ServiceError::Notification { .. } => e,
                            other => ServiceError::notification(other.to_string()),
                        }
                    })?;
                info!("Verification code dispatched to {}", mask_recipient(recipient));
                Ok(())
            }
        }
    }

    /// Checks `input` against the live code for `recipient`.
    ///
    /// Returns `Ok(false)` on a mismatch below the attempt cap. A match
    /// consumes the code.
    pub async fn verify(&self, biz: &str, recipient: &str, input: &str) -> ServiceResult<bool> {
        let key = code_key(biz, recipient);
        match self.store.verify_code(&key, input, self.policy()).await? {
            VerifyCodeOutcome::Matched => Ok(true),
            VerifyCodeOutcome::Mismatched => Ok(false),
            VerifyCodeOutcome::TooManyAttempts => {
                warn!(
                    "Verification attempts exhausted for {}",
                    mask_recipient(recipient)
                );
                Err(ServiceError::CodeTooManyAttempts)
            }
            VerifyCodeOutcome::NotFound => Err(ServiceError::CodeNotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sms::memory::MemorySender;
    use crate::services::sms::testing::FlakySender;
    use crate::store::MemoryStore;
    use futures::future::join_all;
    use std::time::Duration;

    const PHONE: &str = "13800138000";

    fn awaited_config() -> CodeConfig {
        CodeConfig {
            dispatch: DispatchMode::Awaited,
            ..CodeConfig::default()
        }
    }

    fn service_with(sms: Arc<dyn SmsService>, config: CodeConfig) -> CodeService {
        CodeService::new(Arc::new(MemoryStore::new()), sms, config)
    }

    fn last_code(sender: &MemorySender) -> String {
        sender.sent().last().unwrap().args[0].clone()
    }

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_key_format() {
        assert_eq!(code_key("login", PHONE), "phone_code:login:13800138000");
    }

    #[tokio::test]
    async fn test_send_then_verify_consumes_code() {
        let sender = Arc::new(MemorySender::new());
        let codes = service_with(sender.clone(), awaited_config());

        codes.send("login", PHONE).await.unwrap();
        let code = last_code(&sender);
        assert_eq!(sender.sent()[0].template_id, "1877556");

        assert!(codes.verify("login", PHONE, &code).await.unwrap());
        let err = codes.verify("login", PHONE, &code).await.unwrap_err();
        assert!(matches!(err, ServiceError::CodeNotFound));
    }

    #[tokio::test]
    async fn test_resend_within_cooldown_is_rejected() {
        let sender = Arc::new(MemorySender::new());
        let codes = service_with(sender.clone(), awaited_config());

        codes.send("login", PHONE).await.unwrap();
        let err = codes.send("login", PHONE).await.unwrap_err();
        assert!(matches!(err, ServiceError::CodeCooldown));
        assert_eq!(sender.sent().len(), 1);

        // Other business scopes are independent.
        codes.send("bind", PHONE).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_write_once() {
        let sender = Arc::new(MemorySender::new());
        let codes = Arc::new(service_with(sender.clone(), awaited_config()));

        let calls = (0..16).map(|_| {
            let codes = codes.clone();
            tokio::spawn(async move { codes.send("login", PHONE).await })
        });
        let results: Vec<_> = join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let created = results.iter().filter(|r| r.is_ok()).count();
        let cooldown = results
            .iter()
            .filter(|r| matches!(r, Err(ServiceError::CodeCooldown)))
            .count();
        assert_eq!(created, 1);
        assert_eq!(cooldown, 15);
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_correct_verifies_match_once() {
        let sender = Arc::new(MemorySender::new());
        let codes = Arc::new(service_with(sender.clone(), awaited_config()));
        codes.send("login", PHONE).await.unwrap();
        let code = last_code(&sender);

        let calls = (0..8).map(|_| {
            let codes = codes.clone();
            let code = code.clone();
            tokio::spawn(async move { codes.verify("login", PHONE, &code).await })
        });
        let matched = join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .filter(|r| matches!(r, Ok(true)))
            .count();
        assert_eq!(matched, 1);
    }

    #[tokio::test]
    async fn test_attempt_cap() {
        let sender = Arc::new(MemorySender::new());
        let codes = service_with(sender.clone(), awaited_config());
        codes.send("login", PHONE).await.unwrap();
        let code = last_code(&sender);
        let wrong = if code == "000000" { "000001" } else { "000000" };

        for _ in 0..3 {
            assert!(!codes.verify("login", PHONE, wrong).await.unwrap());
        }
        let err = codes.verify("login", PHONE, wrong).await.unwrap_err();
        assert!(matches!(err, ServiceError::CodeTooManyAttempts));

        // The right code no longer helps once the cap is reached.
        let err = codes.verify("login", PHONE, &code).await.unwrap_err();
        assert!(matches!(err, ServiceError::CodeTooManyAttempts));
    }

    #[tokio::test]
    async fn test_expired_code_is_not_found() {
        let sender = Arc::new(MemorySender::new());
        let config = CodeConfig {
            ttl: Duration::from_millis(200),
            resend_cooldown: Duration::from_millis(100),
            ..awaited_config()
        };
        let codes = service_with(sender.clone(), config);
        codes.send("login", PHONE).await.unwrap();
        let code = last_code(&sender);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let err = codes.verify("login", PHONE, &code).await.unwrap_err();
        assert!(matches!(err, ServiceError::CodeNotFound));
    }

    #[tokio::test]
    async fn test_failed_dispatch_keeps_code() {
        let codes = service_with(
            Arc::new(FlakySender::failing(usize::MAX)),
            awaited_config(),
        );

        let err = codes.send("login", PHONE).await.unwrap_err();
        assert!(matches!(err, ServiceError::Notification { .. }));
        // The stored code survived, so a resend is still inside its cooldown.
        let err = codes.send("login", PHONE).await.unwrap_err();
        assert!(matches!(err, ServiceError::CodeCooldown));
    }

    #[tokio::test]
    async fn test_detached_dispatch_returns_before_delivery() {
        let failing = Arc::new(FlakySender::failing(usize::MAX));
        let codes = service_with(failing.clone(), CodeConfig::default());
        codes.send("login", PHONE).await.unwrap();

        let sender = Arc::new(MemorySender::new());
        let codes = service_with(sender.clone(), CodeConfig::default());
        codes.send("login", PHONE).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sender.sent().len(), 1);
        assert_eq!(failing.calls(), 1);
    }
}
