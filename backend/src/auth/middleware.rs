//! Middleware protecting every route outside the public allow-list.

use crate::api::common::{ApiError, unauthorized};
use crate::auth::state::AuthGate;
use axum::{
    extract::{OriginalUri, Request, State},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, USER_AGENT},
    },
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

/// Token from an `Authorization: Bearer <token>` header.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Client fingerprint bound into access credentials.
pub fn fingerprint(headers: &HeaderMap) -> &str {
    headers
        .get(USER_AGENT)
        .and_then(|header| header.to_str().ok())
        .unwrap_or("")
}

/// JWT authentication gate.
///
/// Public paths pass untouched. Everything else needs a live access
/// credential issued to the same User-Agent; its claims are attached to the
/// request extensions for the handlers.
pub async fn auth_gate(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    if gate.is_public(&path) {
        return Ok(next.run(request).await);
    }

    // Owned copies: the request must not be borrowed across the await.
    let token = extract_bearer(request.headers())
        .ok_or_else(unauthorized)?
        .to_string();
    let user_agent = fingerprint(request.headers()).to_string();
    let claims = gate
        .sessions
        .validate_access(&token, &user_agent)
        .await
        .map_err(|e| {
            if e.is_unauthorized() {
                debug!("Rejected credential on {}: {}", path, e);
            } else {
                error!("Credential check failed on {}: {}", path, e);
            }
            unauthorized()
        })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(extract_bearer(&headers), None);
    }

    #[test]
    fn test_fingerprint_defaults_to_empty() {
        let mut headers = HeaderMap::new();
        assert_eq!(fingerprint(&headers), "");
        headers.insert(USER_AGENT, "curl/8.0".parse().unwrap());
        assert_eq!(fingerprint(&headers), "curl/8.0");
    }
}
