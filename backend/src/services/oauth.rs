//! Third-party login through an OAuth2 authorization-code provider.
//!
//! The provider only has two jobs: build the URL the browser is sent to and
//! exchange the code it comes back with for a stable user identity.

use crate::config::OAuthConfig;
use crate::errors::{ServiceError, ServiceResult};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{info, warn};

/// Identity returned by the provider for the logged-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthIdentity {
    /// Unique per account within this application.
    pub open_id: String,
    /// Unique per account across applications of the same vendor, when granted.
    pub union_id: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Authorization URL carrying `state`.
    fn auth_url(&self, state: &str) -> ServiceResult<String>;

    /// Exchanges an authorization code for the account identity.
    async fn verify_code(&self, code: &str) -> ServiceResult<OAuthIdentity>;
}

#[derive(Debug, Default, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    #[serde(default)]
    openid: String,
    #[serde(default)]
    unionid: Option<String>,
}

impl AccessTokenResponse {
    fn into_identity(self) -> ServiceResult<OAuthIdentity> {
        if self.errcode != 0 {
            return Err(ServiceError::oauth_provider(format!(
                "errcode {}: {}",
                self.errcode, self.errmsg
            )));
        }
        if self.openid.is_empty() {
            return Err(ServiceError::oauth_provider("response carries no openid"));
        }
        Ok(OAuthIdentity {
            open_id: self.openid,
            union_id: self.unionid.filter(|id| !id.is_empty()),
        })
    }
}

/// WeChat website QR-code login.
#[derive(Debug, Clone)]
pub struct WechatProvider {
    http_client: Client,
    config: OAuthConfig,
}

impl WechatProvider {
    pub fn new(config: OAuthConfig) -> ServiceResult<Self> {
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
impl OAuthProvider for WechatProvider {
    fn auth_url(&self, state: &str) -> ServiceResult<String> {
        let mut url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("appid", self.config.app_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "snsapi_login"),
                ("state", state),
            ],
        )
        .map_err(|e| ServiceError::internal_error(format!("Invalid authorize URL: {e}")))?;
        url.set_fragment(Some("wechat_redirect"));
        Ok(url.to_string())
    }

    async fn verify_code(&self, code: &str) -> ServiceResult<OAuthIdentity> {
        let response = self
            .http_client
            .get(&self.config.token_url)
            .query(&[
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.app_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::oauth_provider(format!("token endpoint unreachable: {e}")))?;

        if !response.status().is_success() {
            warn!("WeChat token endpoint answered {}", response.status());
            return Err(ServiceError::oauth_provider(format!(
                "token endpoint answered {}",
                response.status()
            )));
        }

        let body: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::oauth_provider(format!("malformed token response: {e}")))?;
        let identity = body.into_identity()?;
        info!("WeChat code exchanged for an identity");
        Ok(identity)
    }
}
