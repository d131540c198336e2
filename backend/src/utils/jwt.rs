//! JWT token utilities for session credentials.
//!
//! Access and refresh credentials are signed with two different secrets so a
//! leaked key only compromises one kind of token. The OAuth `state` cookie
//! has a third one.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;

use crate::config::TokenConfig;
use crate::errors::{ServiceError, ServiceResult};

/// Claims carried by an access credential.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    /// User ID
    pub uid: i64,
    /// Session the credential belongs to
    pub ssid: String,
    /// Client fingerprint captured at issuance
    pub user_agent: String,
    /// Token expiration timestamp
    pub exp: usize,
    /// Token issued at timestamp
    pub iat: usize,
}

/// Claims carried by a refresh credential.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RefreshClaims {
    pub uid: i64,
    pub ssid: String,
    pub exp: usize,
    pub iat: usize,
}

/// Claims of the signed OAuth `state` cookie.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StateClaims {
    pub state: String,
    pub exp: usize,
    pub iat: usize,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and verifies access and refresh credentials.
pub struct JwtUtils {
    access: KeyPair,
    refresh: KeyPair,
    state: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
    state_ttl: Duration,
    validation: Validation,
}

fn timestamps(ttl: Duration) -> (usize, usize) {
    let now = Utc::now().timestamp().max(0) as usize;
    (now, now.saturating_add(ttl.as_secs() as usize))
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> ServiceError {
    match err.kind() {
        ErrorKind::ExpiredSignature => ServiceError::TokenExpired,
        _ => ServiceError::TokenInvalid,
    }
}

impl JwtUtils {
    pub fn new(config: &TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.validate_exp = true;
        validation.leeway = 0;

        JwtUtils {
            access: KeyPair::from_secret(&config.access_secret),
            refresh: KeyPair::from_secret(&config.refresh_secret),
            state: KeyPair::from_secret(&config.state_secret),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            state_ttl: config.state_ttl,
            validation,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn state_ttl(&self) -> Duration {
        self.state_ttl
    }

    /// Generate a short-lived access token bound to `ssid` and the client fingerprint.
    pub fn generate_access_token(
        &self,
        uid: i64,
        ssid: &str,
        user_agent: &str,
    ) -> ServiceResult<String> {
        let (iat, exp) = timestamps(self.access_ttl);
        let claims = AccessClaims {
            uid,
            ssid: ssid.to_string(),
            user_agent: user_agent.to_string(),
            exp,
            iat,
        };
        self.sign(&claims, &self.access.encoding)
    }

    /// Generate a long-lived refresh token bound to `ssid`.
    pub fn generate_refresh_token(&self, uid: i64, ssid: &str) -> ServiceResult<String> {
        let (iat, exp) = timestamps(self.refresh_ttl);
        let claims = RefreshClaims {
            uid,
            ssid: ssid.to_string(),
            exp,
            iat,
        };
        self.sign(&claims, &self.refresh.encoding)
    }

    /// Check signature and expiry of an access token.
    pub fn validate_access_token(&self, token: &str) -> ServiceResult<AccessClaims> {
        self.verify(token, &self.access.decoding)
    }

    /// Check signature and expiry of a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> ServiceResult<RefreshClaims> {
        self.verify(token, &self.refresh.decoding)
    }

    /// Sign an OAuth `state` value for the round trip through the browser.
    pub fn generate_state_token(&self, state: &str) -> ServiceResult<String> {
        let (iat, exp) = timestamps(self.state_ttl);
        let claims = StateClaims {
            state: state.to_string(),
            exp,
            iat,
        };
        self.sign(&claims, &self.state.encoding)
    }

    pub fn validate_state_token(&self, token: &str) -> ServiceResult<StateClaims> {
        self.verify(token, &self.state.decoding)
    }

    fn sign<T: Serialize>(&self, claims: &T, key: &EncodingKey) -> ServiceResult<String> {
        encode(&Header::new(Algorithm::HS512), claims, key)
            .map_err(|e| ServiceError::internal_error(format!("Token generation failed: {e}")))
    }

    fn verify<T: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> ServiceResult<T> {
        decode::<T>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(map_decode_error)
    }
}
