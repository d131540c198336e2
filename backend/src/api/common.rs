//! Response envelope and error mapping shared by every handler.
//!
//! All responses use the [`ApiResponse`] envelope. Failures carry:
//! - `error_type`: machine-readable category
//! - `details`: optional field-specific validation errors
//!
//! Authentication failures all map to the same `unauthorized` body so a
//! client cannot tell a revoked session from a forged token.

use crate::errors::ServiceError;
use axum::{Json, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Standard API response wrapper for all endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Indicates if the request was successful
    pub success: bool,
    /// Response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Human-readable message
    pub message: String,
    /// Error details (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
    /// Request timestamp
    pub timestamp: String,
}

/// Error details for failed requests
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error type identifier
    pub error_type: String,
    /// Field-specific validation errors when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

/// Field-specific validation error details
#[derive(Debug, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ApiResponse<()>>);

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Create a successful response with default message
    pub fn ok(data: T) -> Self {
        Self::success(data, "Request successful")
    }
}

impl ApiResponse<()> {
    /// Successful response without a payload
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: message.into(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Create an error response
    pub fn error(
        message: impl Into<String>,
        error_type: impl Into<String>,
        details: Option<Vec<FieldError>>,
    ) -> Self {
        ApiResponse {
            success: false,
            data: None,
            message: message.into(),
            error: Some(ErrorDetails {
                error_type: error_type.into(),
                details,
            }),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Body used for every 401.
pub fn unauthorized() -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::error("Unauthorized", "unauthorized", None)),
    )
}

/// Converts ServiceError to appropriate HTTP response with standard format
pub fn service_error_to_http(error: ServiceError) -> ApiError {
    let (status, error_type, message) = match error {
        ServiceError::Validation { message } => {
            (StatusCode::BAD_REQUEST, "validation_error", message)
        }
        ServiceError::NotFound { entity, identifier } => (
            StatusCode::NOT_FOUND,
            "not_found",
            format!("{entity} '{identifier}' not found"),
        ),
        ServiceError::AlreadyExists { entity, identifier } => (
            StatusCode::CONFLICT,
            "already_exists",
            format!("{entity} '{identifier}' already exists"),
        ),
        ServiceError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "Invalid email or password".to_string(),
        ),
        ServiceError::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "Too many requests".to_string(),
        ),
        ServiceError::CodeCooldown => (
            StatusCode::TOO_MANY_REQUESTS,
            "code_cooldown",
            "Verification code sent too recently, try again later".to_string(),
        ),
        ServiceError::CodeTooManyAttempts => (
            StatusCode::TOO_MANY_REQUESTS,
            "code_too_many_attempts",
            "Too many verification attempts".to_string(),
        ),
        ServiceError::CodeNotFound => (
            StatusCode::BAD_REQUEST,
            "code_not_found",
            "Verification code not found or expired".to_string(),
        ),
        ServiceError::StoreUnavailable { source } => {
            error!("Store unavailable: {}", source);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                "Service temporarily unavailable".to_string(),
            )
        }
        ServiceError::Database { source } => {
            error!("Database error: {}", source);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "database_error",
                "Internal server error".to_string(),
            )
        }
        ServiceError::Notification { message } => {
            error!("Notification error: {}", message);
            (
                StatusCode::BAD_GATEWAY,
                "notification_error",
                "Failed to deliver verification code".to_string(),
            )
        }
        ServiceError::OAuthProvider { message } => {
            warn!("OAuth provider error: {}", message);
            (
                StatusCode::BAD_GATEWAY,
                "oauth_provider_error",
                "Third-party login failed".to_string(),
            )
        }
        ServiceError::InternalError { message } => {
            error!("Internal error: {}", message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
            )
        }
        ServiceError::TokenInvalid | ServiceError::TokenExpired | ServiceError::SessionRevoked => {
            return unauthorized();
        }
    };

    (
        status,
        Json(ApiResponse::error(message, error_type, None)),
    )
}

/// Formats validator::ValidationErrors into field-specific error details
pub fn validation_errors_to_field_errors(errors: &validator::ValidationErrors) -> Vec<FieldError> {
    let mut fields: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| FieldError {
                field: field.to_string(),
                message: error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "Invalid value".to_string()),
            })
        })
        .collect();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

/// Helper to create validation error response
pub fn validation_error_response(errors: validator::ValidationErrors) -> ApiError {
    let field_errors = validation_errors_to_field_errors(&errors);
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::error(
            "Validation failed",
            "validation_error",
            Some(field_errors),
        )),
    )
}
