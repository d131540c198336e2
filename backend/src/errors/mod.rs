//! Global application error types.
//!
//! `ServiceError` is what every service returns; the HTTP layer turns it
//! into a status code through `api::common::service_error_to_http`.
//! Authentication failures are kept as separate variants for logging, but
//! are rendered to the client as one undifferentiated "unauthorized".

use crate::store::StoreError;
use thiserror::Error;

/// Generic service error that can be used across all entities
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("{entity} not found: {identifier}")]
    NotFound { entity: String, identifier: String },

    #[error("{entity} already exists: {identifier}")]
    AlreadyExists { entity: String, identifier: String },

    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The caller exceeded a sliding-window quota.
    #[error("Too many requests")]
    RateLimited,

    /// A live code was issued less than one cooldown window ago.
    #[error("Verification code sent too recently")]
    CodeCooldown,

    #[error("Too many verification attempts")]
    CodeTooManyAttempts,

    #[error("Verification code not found or expired")]
    CodeNotFound,

    /// Bad signature, malformed token or fingerprint mismatch.
    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token expired")]
    TokenExpired,

    #[error("Session has been revoked")]
    SessionRevoked,

    #[error("Store unavailable: {source}")]
    StoreUnavailable {
        #[from]
        source: StoreError,
    },

    #[error("Database error: {source}")]
    Database {
        #[from]
        source: anyhow::Error,
    },

    #[error("Notification delivery failed: {message}")]
    Notification { message: String },

    /// The OAuth provider rejected the code or could not be reached.
    #[error("OAuth provider error: {message}")]
    OAuthProvider { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    // Helper constructors for common patterns

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            identifier: identifier.into(),
        }
    }

    pub fn already_exists(entity: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity: entity.into(),
            identifier: identifier.into(),
        }
    }

    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }

    pub fn oauth_provider(message: impl Into<String>) -> Self {
        Self::OAuthProvider {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// True for every failure the auth gate answers with 401.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::TokenInvalid | Self::TokenExpired | Self::SessionRevoked
        )
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            source: anyhow::Error::new(err),
        }
    }
}
