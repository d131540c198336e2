//! Central module for application-wide configuration settings.
//!
//! Everything is read from the environment (optionally via a `.env` file)
//! once at startup and handed to the components that need it. Signing keys
//! in particular are never read anywhere else.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Signing secrets and lifetimes for session credentials.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Secret for access credentials.
    pub access_secret: String,
    /// Secret for refresh credentials. Must differ from `access_secret`.
    pub refresh_secret: String,
    /// Secret for the OAuth `state` cookie. Must differ from both above.
    pub state_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub state_ttl: Duration,
}

/// How the code dispatch in `CodeService::send` is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Spawned in the background; failures are only logged.
    Detached,
    /// Awaited by the caller; failures are returned.
    Awaited,
}

impl FromStr for DispatchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "detached" => Ok(Self::Detached),
            "awaited" => Ok(Self::Awaited),
            other => anyhow::bail!("unknown dispatch mode '{other}'"),
        }
    }
}

/// Verification code settings.
#[derive(Debug, Clone)]
pub struct CodeConfig {
    pub ttl: Duration,
    pub resend_cooldown: Duration,
    pub max_attempts: u32,
    /// Template id handed to the notification channel.
    pub template_id: String,
    pub dispatch: DispatchMode,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            resend_cooldown: Duration::from_secs(60),
            max_attempts: 3,
            template_id: "1877556".to_string(),
            dispatch: DispatchMode::Detached,
        }
    }
}

/// What a caller does when the limiter itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Let the request through.
    Open,
    /// Reject the request.
    Closed,
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => anyhow::bail!("unknown failure policy '{other}'"),
        }
    }
}

/// Sliding-window quota.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub interval: Duration,
    pub rate: u32,
    pub on_store_error: FailurePolicy,
}

/// Shared Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout: Duration,
    /// Upper bound for every command, scripts included.
    pub response_timeout: Duration,
    /// Retries when (re)connecting before a call fails.
    pub reconnect_retries: usize,
}

/// How several SMS providers are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverStrategy {
    /// Try every provider in turn, rotating the starting one.
    RoundRobin,
    /// Stay on one provider until it times out repeatedly.
    Timeout,
}

impl FromStr for FailoverStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "round_robin" => Ok(Self::RoundRobin),
            "timeout" => Ok(Self::Timeout),
            other => anyhow::bail!("unknown failover strategy '{other}'"),
        }
    }
}

/// Decorators stacked around the SMS providers.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub failover: FailoverStrategy,
    /// Consecutive timeouts before `Timeout` moves on.
    pub timeout_threshold: u32,
    pub call_timeout: Duration,
    /// Total attempts per message.
    pub retry_max: u32,
    pub rate_limit: RateLimitConfig,
}

/// SMTP settings for email delivery of codes.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
    /// Email-to-SMS gateway domain appended to bare phone numbers.
    pub sms_domain: Option<String>,
}

/// HTTP SMS gateway settings.
#[derive(Debug, Clone)]
pub struct SmsGatewayConfig {
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// WeChat QR-code login.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub app_id: String,
    pub app_secret: String,
    /// Where the provider sends the browser back to.
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub timeout: Duration,
    /// Mark the state cookie `Secure`; off only for plain-HTTP development.
    pub secure_cookie: bool,
}

/// Paths the auth gate lets through without a credential.
#[derive(Debug, Clone)]
pub struct AuthGateConfig {
    pub ignore_paths: Vec<String>,
}

impl Default for AuthGateConfig {
    fn default() -> Self {
        Self {
            ignore_paths: [
                "/health",
                "/users/signup",
                "/users/login",
                "/users/refresh_token",
                "/users/login_sms/code/send",
                "/users/login_sms",
                "/oauth2/wechat/authurl",
                "/oauth2/wechat/callback",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    /// Unset means the in-process store.
    pub redis: Option<RedisConfig>,
    pub server_port: u16,
    pub token: TokenConfig,
    pub code: CodeConfig,
    pub ip_rate_limit: RateLimitConfig,
    /// Key the IP limiter on `X-Forwarded-For` / `X-Real-IP` instead of the
    /// peer address. Only safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
    pub sms: SmsConfig,
    pub email: Option<EmailConfig>,
    pub sms_gateway: Option<SmsGatewayConfig>,
    pub oauth: Option<OAuthConfig>,
    pub auth_gate: AuthGateConfig,
}

fn var_or<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("{name} is invalid: {e}"))
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://authgate.db?mode=rwc".to_string());
        let max_connections = var_or::<u32>("DB_MAX_CONNECTIONS", "5")?;
        let acquire_timeout_seconds = var_or::<u64>("DB_ACQUIRE_TIMEOUT_SECONDS", "3")?;
        let redis = match env::var("REDIS_URL").ok().filter(|s| !s.is_empty()) {
            Some(url) => Some(RedisConfig {
                url,
                connection_timeout: Duration::from_millis(var_or("REDIS_CONNECT_TIMEOUT_MS", "1000")?),
                response_timeout: Duration::from_millis(var_or("REDIS_RESPONSE_TIMEOUT_MS", "500")?),
                reconnect_retries: var_or("REDIS_RECONNECT_RETRIES", "3")?,
            }),
            None => None,
        };
        let server_port = var_or::<u16>("SERVER_PORT", "8080")?;

        let access_secret = env::var("JWT_ACCESS_SECRET").context("JWT_ACCESS_SECRET not set")?;
        let refresh_secret =
            env::var("JWT_REFRESH_SECRET").context("JWT_REFRESH_SECRET not set")?;
        let state_secret = env::var("JWT_STATE_SECRET").context("JWT_STATE_SECRET not set")?;
        if access_secret == refresh_secret
            || state_secret == access_secret
            || state_secret == refresh_secret
        {
            anyhow::bail!("JWT_ACCESS_SECRET, JWT_REFRESH_SECRET and JWT_STATE_SECRET must differ");
        }
        let token = TokenConfig {
            access_secret,
            refresh_secret,
            state_secret,
            access_ttl: Duration::from_secs(var_or("JWT_ACCESS_TTL_SECONDS", "1800")?),
            refresh_ttl: Duration::from_secs(var_or("JWT_REFRESH_TTL_SECONDS", "604800")?),
            state_ttl: Duration::from_secs(var_or("JWT_STATE_TTL_SECONDS", "600")?),
        };

        let code = CodeConfig {
            ttl: Duration::from_secs(var_or("CODE_TTL_SECONDS", "600")?),
            resend_cooldown: Duration::from_secs(var_or("CODE_RESEND_COOLDOWN_SECONDS", "60")?),
            max_attempts: var_or("CODE_MAX_ATTEMPTS", "3")?,
            template_id: env::var("CODE_TEMPLATE_ID").unwrap_or_else(|_| "1877556".to_string()),
            dispatch: var_or("CODE_DISPATCH_MODE", "detached")?,
        };

        let ip_rate_limit = RateLimitConfig {
            interval: Duration::from_millis(var_or("IP_RATE_LIMIT_INTERVAL_MS", "1000")?),
            rate: var_or("IP_RATE_LIMIT_RATE", "100")?,
            on_store_error: var_or("IP_RATE_LIMIT_ON_ERROR", "closed")?,
        };
        let trust_proxy_headers = var_or("IP_RATE_LIMIT_TRUST_PROXY", "false")?;
        let sms = SmsConfig {
            failover: var_or("SMS_FAILOVER_STRATEGY", "round_robin")?,
            timeout_threshold: var_or("SMS_TIMEOUT_THRESHOLD", "3")?,
            call_timeout: Duration::from_secs(var_or("SMS_CALL_TIMEOUT_SECONDS", "5")?),
            retry_max: var_or("SMS_RETRY_MAX", "3")?,
            rate_limit: RateLimitConfig {
                interval: Duration::from_millis(var_or("SMS_RATE_LIMIT_INTERVAL_MS", "1000")?),
                rate: var_or("SMS_RATE_LIMIT_RATE", "100")?,
                on_store_error: var_or("SMS_RATE_LIMIT_ON_ERROR", "closed")?,
            },
        };

        let email = match env::var("SMTP_HOST") {
            Ok(smtp_host) => Some(EmailConfig {
                smtp_host,
                smtp_port: var_or("SMTP_PORT", "587")?,
                smtp_username: env::var("SMTP_USERNAME").context("SMTP_USERNAME not set")?,
                smtp_password: env::var("SMTP_PASSWORD").context("SMTP_PASSWORD not set")?,
                from_email: env::var("SMTP_FROM_EMAIL").context("SMTP_FROM_EMAIL not set")?,
                from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "authgate".to_string()),
                sms_domain: env::var("SMTP_SMS_DOMAIN").ok().filter(|s| !s.is_empty()),
            }),
            Err(_) => None,
        };

        let sms_gateway = match env::var("SMS_GATEWAY_URL") {
            Ok(url) => Some(SmsGatewayConfig {
                url,
                api_key: env::var("SMS_GATEWAY_API_KEY").context("SMS_GATEWAY_API_KEY not set")?,
                timeout: Duration::from_secs(var_or("SMS_GATEWAY_TIMEOUT_SECONDS", "10")?),
            }),
            Err(_) => None,
        };

        let oauth = match env::var("WECHAT_APP_ID") {
            Ok(app_id) => Some(OAuthConfig {
                app_id,
                app_secret: env::var("WECHAT_APP_SECRET").context("WECHAT_APP_SECRET not set")?,
                redirect_uri: env::var("WECHAT_REDIRECT_URI")
                    .context("WECHAT_REDIRECT_URI not set")?,
                authorize_url: env::var("WECHAT_AUTHORIZE_URL")
                    .unwrap_or_else(|_| "https://open.weixin.qq.com/connect/qrconnect".to_string()),
                token_url: env::var("WECHAT_TOKEN_URL").unwrap_or_else(|_| {
                    "https://api.weixin.qq.com/sns/oauth2/access_token".to_string()
                }),
                timeout: Duration::from_secs(var_or("WECHAT_TIMEOUT_SECONDS", "10")?),
                secure_cookie: var_or("OAUTH_SECURE_COOKIE", "true")?,
            }),
            Err(_) => None,
        };

        Ok(Config {
            database_url,
            max_connections,
            acquire_timeout_seconds,
            redis,
            server_port,
            token,
            code,
            ip_rate_limit,
            trust_proxy_headers,
            sms,
            email,
            sms_gateway,
            oauth,
            auth_gate: AuthGateConfig::default(),
        })
    }
}
