use super::{SmsService, mask_recipient};
use crate::config::EmailConfig;
use crate::errors::{ServiceError, ServiceResult};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::str::FromStr;
use tracing::info;

/// Delivers codes by mail, either to plain addresses or through an
/// email-to-SMS gateway domain.
pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    config: EmailConfig,
}

impl EmailSender {
    /// Creates a new EmailSender instance
    pub fn new(config: EmailConfig) -> ServiceResult<Self> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| ServiceError::validation(format!("Invalid SMTP host: {e}")))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self { mailer, config })
    }

    /// Sends a single code message
    async fn send_code(&self, to_email: &str, code: &str) -> ServiceResult<()> {
        let from_mailbox = Mailbox::from_str(&format!(
            "{} <{}>",
            self.config.from_name, self.config.from_email
        ))
        .map_err(|e| ServiceError::validation(format!("Invalid from email: {e}")))?;

        let to_mailbox = Mailbox::from_str(to_email)
            .map_err(|e| ServiceError::validation(format!("Invalid recipient email: {e}")))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject("Your verification code")
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(build_code_text(code)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(build_code_html(code)),
                    ),
            )
            .map_err(|e| ServiceError::notification(format!("Failed to build email: {e}")))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| ServiceError::notification(format!("Failed to send email: {e}")))?;

        Ok(())
    }
}

/// Mail address for `recipient`: as given when it already is one, otherwise
/// the number at the configured gateway domain.
fn recipient_address(recipient: &str, sms_domain: Option<&str>) -> ServiceResult<String> {
    if recipient.contains('@') {
        return Ok(recipient.to_string());
    }
    match sms_domain {
        Some(domain) => Ok(format!("{recipient}@{domain}")),
        None => Err(ServiceError::validation(
            "Recipient is not an email address and no SMS domain is configured",
        )),
    }
}

fn build_code_text(code: &str) -> String {
    format!("Your verification code is {code}. It expires in 10 minutes.")
}

fn build_code_html(code: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <p>Your verification code is</p>
    <p style="font-size: 24px; letter-spacing: 4px;"><strong>{code}</strong></p>
    <p style="font-size: 12px; color: #7f8c8d;">It expires in 10 minutes. If you didn't request it, you can safely ignore this email.</p>
</body>
</html>"#
    )
}

#[async_trait]
impl SmsService for EmailSender {
    async fn send(
        &self,
        template_id: &str,
        args: &[String],
        numbers: &[String],
    ) -> ServiceResult<()> {
        let code = args
            .first()
            .ok_or_else(|| ServiceError::validation("Missing code argument"))?;

        for number in numbers {
            let address = recipient_address(number, self.config.sms_domain.as_deref())?;
            self.send_code(&address, code).await?;
            info!(
                "Sent template {} by email to {}",
                template_id,
                mask_recipient(number)
            );
        }
        Ok(())
    }
}
