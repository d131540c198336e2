//! Session credentials: issuance, validation, refresh and revocation.
//!
//! A session is identified by an `ssid` shared by every credential minted
//! for one login. Revoking the session writes a marker key the gate checks on
//! every request, which invalidates all of those credentials at once.

use crate::errors::{ServiceError, ServiceResult};
use crate::store::AtomicKeyStore;
use crate::utils::jwt::{AccessClaims, JwtUtils};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Credential pair handed to the client after a successful login.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub ssid: String,
    pub access_token: String,
    pub refresh_token: String,
}

fn revocation_key(ssid: &str) -> String {
    format!("users:ssid:{ssid}")
}

pub struct SessionManager {
    jwt: JwtUtils,
    store: Arc<dyn AtomicKeyStore>,
}

impl SessionManager {
    pub fn new(jwt: JwtUtils, store: Arc<dyn AtomicKeyStore>) -> Self {
        Self { jwt, store }
    }

    /// Starts a new session for `user_id` and mints its first credentials.
    pub fn issue_session(&self, user_id: i64, fingerprint: &str) -> ServiceResult<SessionTokens> {
        let ssid = Uuid::now_v7().to_string();
        let access_token = self
            .jwt
            .generate_access_token(user_id, &ssid, fingerprint)?;
        let refresh_token = self.jwt.generate_refresh_token(user_id, &ssid)?;

        debug!("Issued session {} for user {}", ssid, user_id);
        Ok(SessionTokens {
            ssid,
            access_token,
            refresh_token,
        })
    }

    /// Checks an access credential presented by a client with `fingerprint`.
    pub async fn validate_access(
        &self,
        token: &str,
        fingerprint: &str,
    ) -> ServiceResult<AccessClaims> {
        let claims = self.jwt.validate_access_token(token)?;
        if claims.uid <= 0 {
            return Err(ServiceError::TokenInvalid);
        }
        if claims.user_agent != fingerprint {
            warn!("Fingerprint mismatch for session {}", claims.ssid);
            return Err(ServiceError::TokenInvalid);
        }
        self.check_session(&claims.ssid).await?;
        Ok(claims)
    }

    /// Mints a new access credential from a live refresh credential.
    ///
    /// The refresh credential itself is returned to nobody and stays valid
    /// until it expires or the session is revoked.
    pub async fn refresh(&self, refresh_token: &str, fingerprint: &str) -> ServiceResult<String> {
        let claims = self.jwt.validate_refresh_token(refresh_token)?;
        if claims.uid <= 0 {
            return Err(ServiceError::TokenInvalid);
        }
        self.check_session(&claims.ssid).await?;

        let access_token = self
            .jwt
            .generate_access_token(claims.uid, &claims.ssid, fingerprint)?;
        debug!("Refreshed access credential for session {}", claims.ssid);
        Ok(access_token)
    }

    /// Invalidates every credential carrying `ssid`.
    ///
    /// The marker outlives any refresh credential of the session.
    pub async fn revoke(&self, ssid: &str) -> ServiceResult<()> {
        self.store
            .set_with_expiry(&revocation_key(ssid), "", self.jwt.refresh_ttl())
            .await?;
        info!("Session {} revoked", ssid);
        Ok(())
    }

    /// Fails with `SessionRevoked` when `ssid` carries a revocation marker.
    pub async fn check_session(&self, ssid: &str) -> ServiceResult<()> {
        if self.store.exists(&revocation_key(ssid)).await? {
            return Err(ServiceError::SessionRevoked);
        }
        Ok(())
    }

    pub fn access_ttl_seconds(&self) -> u64 {
        self.jwt.access_ttl().as_secs()
    }

    /// Draws a random OAuth `state` and signs it.
    ///
    /// Returns the raw value for the provider URL and the signed token the
    /// browser keeps in a cookie until the callback.
    pub fn begin_oauth(&self) -> ServiceResult<(String, String)> {
        let state = Uuid::new_v4().to_string();
        let token = self.jwt.generate_state_token(&state)?;
        Ok((state, token))
    }

    /// Checks that the callback's `state` is the one signed in `token`.
    pub fn verify_oauth_state(&self, token: Option<&str>, state: &str) -> ServiceResult<()> {
        let token = token.ok_or(ServiceError::TokenInvalid)?;
        let claims = self.jwt.validate_state_token(token)?;
        if claims.state != state {
            warn!("OAuth state mismatch");
            return Err(ServiceError::TokenInvalid);
        }
        Ok(())
    }

    pub fn oauth_state_ttl(&self) -> Duration {
        self.jwt.state_ttl()
    }
}
