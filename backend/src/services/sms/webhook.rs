//! Sender for HTTP SMS gateways.

use super::{SmsService, mask_recipient};
use crate::config::SmsGatewayConfig;
use crate::errors::{ServiceError, ServiceResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    template_id: &'a str,
    args: &'a [String],
    numbers: &'a [String],
}

/// Posts each message as JSON to a gateway endpoint.
#[derive(Debug, Clone)]
pub struct GatewaySender {
    http_client: Client,
    config: SmsGatewayConfig,
}

impl GatewaySender {
    pub fn new(config: SmsGatewayConfig) -> ServiceResult<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::internal_error(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            config,
        })
    }
}

#[async_trait]
impl SmsService for GatewaySender {
    async fn send(
        &self,
        template_id: &str,
        args: &[String],
        numbers: &[String],
    ) -> ServiceResult<()> {
        let payload = GatewayRequest {
            template_id,
            args,
            numbers,
        };

        let response = self
            .http_client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .header("User-Agent", "authgate/1.0")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::notification(format!("SMS gateway unreachable: {e}")))?;

        let masked: Vec<String> = numbers.iter().map(|n| mask_recipient(n)).collect();
        if response.status().is_success() {
            info!("SMS template {} sent to {:?}", template_id, masked);
            Ok(())
        } else {
            warn!(
                "SMS gateway answered {} for template {}",
                response.status(),
                template_id
            );
            Err(ServiceError::notification(format!(
                "SMS gateway answered {}",
                response.status()
            )))
        }
    }
}
