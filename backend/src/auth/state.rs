//! Shared state handed to every handler and to the auth gate.

use crate::auth::session::SessionManager;
use crate::config::AuthGateConfig;
use crate::services::code_service::CodeService;
use crate::services::oauth::OAuthProvider;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub sessions: Arc<SessionManager>,
    pub codes: Arc<CodeService>,
    /// WeChat login; its routes are only mounted when set.
    pub oauth: Option<Arc<dyn OAuthProvider>>,
    /// `Secure` flag of the OAuth state cookie.
    pub secure_cookies: bool,
}

/// State of the auth gate middleware.
#[derive(Clone)]
pub struct AuthGate {
    pub sessions: Arc<SessionManager>,
    ignore_paths: Arc<HashSet<String>>,
}

impl AuthGate {
    pub fn new(sessions: Arc<SessionManager>, config: &AuthGateConfig) -> Self {
        Self {
            sessions,
            ignore_paths: Arc::new(config.ignore_paths.iter().cloned().collect()),
        }
    }

    /// Whether `path` is reachable without a credential.
    pub fn is_public(&self, path: &str) -> bool {
        self.ignore_paths.contains(path)
    }
}
