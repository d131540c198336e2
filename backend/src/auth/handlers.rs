//! Handler functions for the `/users` and `/oauth2/wechat` endpoints.
//!
//! Handlers validate the payload, call `auth::service` and translate the
//! outcome. Credentials are returned in the `x-jwt-token` and
//! `x-refresh-token` response headers, never in the body.

use crate::api::common::{
    ApiError, ApiResponse, service_error_to_http, unauthorized, validation_error_response,
};
use crate::auth::middleware::{extract_bearer, fingerprint};
use crate::auth::models::*;
use crate::auth::service::AuthService;
use crate::auth::session::SessionTokens;
use crate::auth::state::AppState;
use crate::errors::ServiceError;
use crate::utils::jwt::AccessClaims;
use axum::{
    extract::{Extension, Json, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use validator::Validate;

pub const ACCESS_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-jwt-token");
pub const REFRESH_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-refresh-token");

/// Cookie carrying the signed OAuth state between authurl and callback.
pub const STATE_COOKIE: &str = "jwt-state";
pub const OAUTH_CALLBACK_PATH: &str = "/oauth2/wechat/callback";

type TokenResponse = (HeaderMap, Json<ApiResponse<LoginResponse>>);

fn header_value(token: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(token).map_err(|e| {
        service_error_to_http(ServiceError::internal_error(format!(
            "Token is not a valid header value: {e}"
        )))
    })
}

fn login_response(
    user_id: i64,
    tokens: &SessionTokens,
    expires_in: u64,
) -> Result<TokenResponse, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_TOKEN_HEADER, header_value(&tokens.access_token)?);
    headers.insert(REFRESH_TOKEN_HEADER, header_value(&tokens.refresh_token)?);

    Ok((
        headers,
        Json(ApiResponse::success(
            LoginResponse {
                user_id,
                expires_in,
            },
            "Login successful",
        )),
    ))
}

/// Handle password signup
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProfileResponse>>), ApiError> {
    payload.validate().map_err(validation_error_response)?;

    let user = AuthService::new(&state)
        .signup(&payload.email, &payload.password)
        .await
        .map_err(service_error_to_http)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(user.into(), "Signup successful")),
    ))
}

/// Handle email/password login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<TokenResponse, ApiError> {
    payload.validate().map_err(validation_error_response)?;

    let auth = AuthService::new(&state);
    let (user, tokens) = auth
        .login(&payload.email, &payload.password, fingerprint(&headers))
        .await
        .map_err(service_error_to_http)?;

    login_response(user.id, &tokens, auth.access_ttl_seconds())
}

/// Send a login code to a phone number
pub async fn send_login_code(
    State(state): State<AppState>,
    Json(payload): Json<SendCodeRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    payload.validate().map_err(validation_error_response)?;

    AuthService::new(&state)
        .send_login_code(&payload.phone)
        .await
        .map_err(service_error_to_http)?;

    Ok(Json(ApiResponse::message("Verification code sent")))
}

/// Log in with a phone number and the code sent to it
pub async fn login_sms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginSmsRequest>,
) -> Result<TokenResponse, ApiError> {
    payload.validate().map_err(validation_error_response)?;

    let auth = AuthService::new(&state);
    let (user, tokens) = auth
        .login_sms(&payload.phone, &payload.code, fingerprint(&headers))
        .await
        .map_err(service_error_to_http)?;

    login_response(user.id, &tokens, auth.access_ttl_seconds())
}

/// Mint a new access credential; the refresh credential comes in the bearer slot
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Json<ApiResponse<()>>), ApiError> {
    let refresh = extract_bearer(&headers).ok_or_else(unauthorized)?;

    let access_token = AuthService::new(&state)
        .refresh(refresh, fingerprint(&headers))
        .await
        .map_err(service_error_to_http)?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(ACCESS_TOKEN_HEADER, header_value(&access_token)?);
    Ok((
        response_headers,
        Json(ApiResponse::message("Token refreshed")),
    ))
}

/// Revoke the caller's session and clear the client's credentials
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<(HeaderMap, Json<ApiResponse<()>>), ApiError> {
    AuthService::new(&state)
        .logout(&claims.ssid)
        .await
        .map_err(service_error_to_http)?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_static(""));
    headers.insert(REFRESH_TOKEN_HEADER, HeaderValue::from_static(""));
    Ok((headers, Json(ApiResponse::message("Logged out successfully"))))
}

/// Get current user information from the access credential
pub async fn profile(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<Json<ApiResponse<ProfileResponse>>, ApiError> {
    let user = AuthService::new(&state)
        .profile(claims.uid)
        .await
        .map_err(service_error_to_http)?;

    Ok(Json(ApiResponse::ok(user.into())))
}

/// Start a WeChat login: returns the provider URL and sets the state cookie
pub async fn oauth_auth_url(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiResponse<OAuthUrlResponse>>), ApiError> {
    let (url, state_token) = AuthService::new(&state)
        .oauth_authorize()
        .map_err(service_error_to_http)?;

    let max_age = i64::try_from(state.sessions.oauth_state_ttl().as_secs()).unwrap_or(i64::MAX);
    let cookie = Cookie::build((STATE_COOKIE, state_token))
        .path(OAUTH_CALLBACK_PATH)
        .http_only(true)
        .secure(state.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age))
        .build();

    Ok((
        jar.add(cookie),
        Json(ApiResponse::ok(OAuthUrlResponse { url })),
    ))
}

/// Provider redirect target: checks the state and logs the user in
pub async fn oauth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<(CookieJar, HeaderMap, Json<ApiResponse<LoginResponse>>), ApiError> {
    let state_token = jar.get(STATE_COOKIE).map(|c| c.value().to_string());

    let auth = AuthService::new(&state);
    let (user, tokens) = auth
        .oauth_login(
            &query.code,
            &query.state,
            state_token.as_deref(),
            fingerprint(&headers),
        )
        .await
        .map_err(service_error_to_http)?;

    let (response_headers, body) = login_response(user.id, &tokens, auth.access_ttl_seconds())?;
    let jar = jar.remove(Cookie::build(STATE_COOKIE).path(OAUTH_CALLBACK_PATH));
    Ok((jar, response_headers, body))
}

pub async fn health() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(
        serde_json::json!({
            "service": "authgate",
            "version": env!("CARGO_PKG_VERSION"),
        }),
        "OK",
    ))
}
