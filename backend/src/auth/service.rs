//! Core business logic for the authentication flows.
//!
//! Every successful login, by password, SMS code or WeChat, ends in
//! [`SessionManager::issue_session`] for the resolved user.

use crate::auth::session::{SessionManager, SessionTokens};
use crate::auth::state::AppState;
use crate::database::models::User;
use crate::errors::{ServiceError, ServiceResult};
use crate::services::code_service::CodeService;
use crate::services::oauth::OAuthProvider;
use crate::services::user_service::UserService;
use std::sync::Arc;
use tracing::info;

/// Business scope of codes sent for SMS login.
pub const LOGIN_BIZ: &str = "login";

/// Authentication service for signup, login, refresh and logout
pub struct AuthService<'a> {
    users: UserService<'a>,
    sessions: &'a SessionManager,
    codes: &'a CodeService,
    oauth: Option<&'a Arc<dyn OAuthProvider>>,
}

impl<'a> AuthService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        AuthService {
            users: UserService::new(&state.pool),
            sessions: &state.sessions,
            codes: &state.codes,
            oauth: state.oauth.as_ref(),
        }
    }

    pub async fn signup(&self, email: &str, password: &str) -> ServiceResult<User> {
        self.users.signup(email, password).await
    }

    /// Authenticate by email and password and start a session
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        fingerprint: &str,
    ) -> ServiceResult<(User, SessionTokens)> {
        let user = self.users.login(email, password).await?;
        let tokens = self.sessions.issue_session(user.id, fingerprint)?;
        info!("User {} logged in with password", user.id);
        Ok((user, tokens))
    }

    pub async fn send_login_code(&self, phone: &str) -> ServiceResult<()> {
        self.codes.send(LOGIN_BIZ, phone).await
    }

    /// Authenticate by SMS code, registering the phone on first use
    pub async fn login_sms(
        &self,
        phone: &str,
        code: &str,
        fingerprint: &str,
    ) -> ServiceResult<(User, SessionTokens)> {
        if !self.codes.verify(LOGIN_BIZ, phone, code).await? {
            return Err(ServiceError::validation("Incorrect verification code"));
        }
        let user = self.users.find_or_create_by_phone(phone).await?;
        let tokens = self.sessions.issue_session(user.id, fingerprint)?;
        info!("User {} logged in with SMS code", user.id);
        Ok((user, tokens))
    }

    fn oauth(&self) -> ServiceResult<&'a Arc<dyn OAuthProvider>> {
        self.oauth
            .ok_or_else(|| ServiceError::not_found("OAuth provider", "wechat"))
    }

    /// Starts a WeChat login: the provider URL and the signed state for the cookie.
    pub fn oauth_authorize(&self) -> ServiceResult<(String, String)> {
        let oauth = self.oauth()?;
        let (state, state_token) = self.sessions.begin_oauth()?;
        let url = oauth.auth_url(&state)?;
        Ok((url, state_token))
    }

    /// Finishes a WeChat login once the provider redirected back with `code`.
    ///
    /// `state_token` is the cookie set by [`Self::oauth_authorize`]; it must
    /// sign the `state` the provider echoed.
    pub async fn oauth_login(
        &self,
        code: &str,
        state: &str,
        state_token: Option<&str>,
        fingerprint: &str,
    ) -> ServiceResult<(User, SessionTokens)> {
        let oauth = self.oauth()?;
        self.sessions.verify_oauth_state(state_token, state)?;
        let identity = oauth.verify_code(code).await?;
        let user = self.users.find_or_create_by_oauth(&identity).await?;
        let tokens = self.sessions.issue_session(user.id, fingerprint)?;
        info!("User {} logged in with WeChat", user.id);
        Ok((user, tokens))
    }

    pub async fn refresh(&self, refresh_token: &str, fingerprint: &str) -> ServiceResult<String> {
        self.sessions.refresh(refresh_token, fingerprint).await
    }

    pub async fn logout(&self, ssid: &str) -> ServiceResult<()> {
        self.sessions.revoke(ssid).await
    }

    pub async fn profile(&self, user_id: i64) -> ServiceResult<User> {
        self.users.profile(user_id).await
    }

    pub fn access_ttl_seconds(&self) -> u64 {
        self.sessions.access_ttl_seconds()
    }
}
