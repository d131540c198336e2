//! Defines the HTTP routes for authentication.

use crate::auth::handlers::*;
use crate::auth::middleware::auth_gate;
use crate::auth::state::{AppState, AuthGate};
use axum::{
    Router, middleware,
    routing::{get, post},
};

/// Routes nested under `/users`.
pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh_token", post(refresh_token))
        .route("/login_sms/code/send", post(send_login_code))
        .route("/login_sms", post(login_sms))
        .route("/profile", get(profile))
}

/// Routes nested under `/oauth2/wechat`.
pub fn oauth_router() -> Router<AppState> {
    Router::new()
        .route("/authurl", get(oauth_auth_url))
        .route("/callback", get(oauth_callback))
}

/// The full application behind the auth gate.
///
/// The OAuth routes are only mounted when a provider is configured.
pub fn app(state: AppState, gate: AuthGate) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .nest("/users", users_router());
    if state.oauth.is_some() {
        router = router.nest("/oauth2/wechat", oauth_router());
    }
    router
        .layer(middleware::from_fn_with_state(gate, auth_gate))
        .with_state(state)
}
