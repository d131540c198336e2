//! Main entry point for the authgate backend.
//!
//! This file initializes the Axum web server, connects the database and the
//! shared store, assembles the notification channel and registers the routes
//! behind the IP rate limiter and the auth gate.

mod api;
mod auth;
mod config;
mod database;
mod errors;
mod ratelimit;
mod repositories;
mod services;
mod store;
mod utils;

use crate::auth::session::SessionManager;
use crate::auth::state::{AppState, AuthGate};
use crate::config::FailoverStrategy;
use crate::ratelimit::SlidingWindowLimiter;
use crate::ratelimit::middleware::{IpRateLimit, ip_rate_limit};
use crate::services::code_service::CodeService;
use crate::services::oauth::{OAuthProvider, WechatProvider};
use crate::services::sms::SmsService;
use crate::services::sms::email::EmailSender;
use crate::services::sms::failover::{FailoverSender, TimeoutFailoverSender};
use crate::services::sms::memory::MemorySender;
use crate::services::sms::ratelimit::RateLimitedSender;
use crate::services::sms::retry::RetrySender;
use crate::services::sms::webhook::GatewaySender;
use crate::store::{AtomicKeyStore, MemoryStore, RedisStore};
use crate::utils::jwt::JwtUtils;
use anyhow::Result;
use axum::middleware;
use config::Config;
use database::Database;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let db = Database::new(&config).await?;
    db.migrate().await?;

    let store: Arc<dyn AtomicKeyStore> = match &config.redis {
        Some(redis) => Arc::new(RedisStore::connect(redis).await?),
        None => {
            warn!("REDIS_URL not set; using the in-process store, state is not shared between instances");
            Arc::new(MemoryStore::new())
        }
    };

    let sms = build_sms_service(&config, store.clone())?;
    let sessions = Arc::new(SessionManager::new(
        JwtUtils::new(&config.token),
        store.clone(),
    ));
    let codes = Arc::new(CodeService::new(store.clone(), sms, config.code.clone()));

    let oauth: Option<Arc<dyn OAuthProvider>> = match &config.oauth {
        Some(wechat) => Some(Arc::new(WechatProvider::new(wechat.clone())?)),
        None => {
            info!("WECHAT_APP_ID not set; WeChat login is disabled");
            None
        }
    };

    let state = AppState {
        pool: db.pool().clone(),
        sessions: sessions.clone(),
        codes,
        oauth,
        secure_cookies: config.oauth.as_ref().is_none_or(|o| o.secure_cookie),
    };
    let gate = AuthGate::new(sessions, &config.auth_gate);
    let ip_limit = IpRateLimit::new(
        Arc::new(SlidingWindowLimiter::from_config(
            store,
            &config.ip_rate_limit,
        )),
        config.ip_rate_limit.on_store_error,
    )
    .trust_proxy_headers(config.trust_proxy_headers);

    let app = auth::routes::app(state, gate)
        .layer(middleware::from_fn_with_state(ip_limit, ip_rate_limit));

    let bind_address = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;

    info!("Starting authgate server on port {}", config.server_port);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    db.close().await;
    Ok(())
}

/// Providers from configuration, wrapped in failover, retry and rate limiting.
fn build_sms_service(config: &Config, store: Arc<dyn AtomicKeyStore>) -> Result<Arc<dyn SmsService>> {
    let mut providers: Vec<Arc<dyn SmsService>> = Vec::new();
    if let Some(gateway) = &config.sms_gateway {
        providers.push(Arc::new(GatewaySender::new(gateway.clone())?));
    }
    if let Some(email) = &config.email {
        providers.push(Arc::new(EmailSender::new(email.clone())?));
    }

    let name = match providers.len() {
        0 => "memory",
        1 => "primary",
        _ => "failover",
    };
    let delivery: Arc<dyn SmsService> = match providers.len() {
        0 => {
            warn!("No SMS provider configured; codes are only logged");
            Arc::new(MemorySender::new())
        }
        1 => providers.remove(0),
        _ => match config.sms.failover {
            FailoverStrategy::RoundRobin => Arc::new(FailoverSender::new(providers)),
            FailoverStrategy::Timeout => Arc::new(TimeoutFailoverSender::new(
                providers,
                config.sms.timeout_threshold,
                config.sms.call_timeout,
            )),
        },
    };

    let retrying = Arc::new(RetrySender::new(delivery, config.sms.retry_max));
    let limiter = Arc::new(SlidingWindowLimiter::from_config(store, &config.sms.rate_limit));
    let sender: Arc<dyn SmsService> = Arc::new(RateLimitedSender::new(
        retrying,
        limiter,
        name,
        config.sms.rate_limit.on_store_error,
    ));
    Ok(sender)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
