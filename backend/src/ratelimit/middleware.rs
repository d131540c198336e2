//! Per-client-IP rate limiting for every inbound request.

use super::Limiter;
use crate::config::FailurePolicy;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, warn};

/// State for [`ip_rate_limit`].
#[derive(Clone)]
pub struct IpRateLimit {
    limiter: Arc<dyn Limiter>,
    prefix: String,
    on_store_error: FailurePolicy,
    trust_proxy_headers: bool,
}

impl IpRateLimit {
    /// Keys on the peer address; see [`IpRateLimit::trust_proxy_headers`].
    pub fn new(limiter: Arc<dyn Limiter>, on_store_error: FailurePolicy) -> Self {
        Self {
            limiter,
            prefix: "ip-limiter".to_string(),
            on_store_error,
            trust_proxy_headers: false,
        }
    }

    /// Key on the proxy headers instead. Clients pick those headers freely,
    /// so only enable this behind a proxy that overwrites them.
    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }
}

/// Client address used as the limiter key.
///
/// The peer address, unless `trust_proxy_headers` is set, in which case the
/// first `X-Forwarded-For` hop, then `X-Real-IP`, win over the peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(headers) {
            return ip;
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Rejects with 429 once the client IP is over quota.
///
/// A limiter failure is resolved by the configured [`FailurePolicy`]:
/// `Closed` answers 500, `Open` lets the request through.
pub async fn ip_rate_limit(
    State(config): State<IpRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(request.headers(), peer, config.trust_proxy_headers);
    let key = format!("{}:{}", config.prefix, ip);

    match config.limiter.limit(&key).await {
        Ok(false) => Ok(next.run(request).await),
        Ok(true) => {
            warn!("Rate limit exceeded for {}", key);
            Err(StatusCode::TOO_MANY_REQUESTS)
        }
        Err(e) => {
            error!("Rate limiter unavailable for {}: {}", key, e);
            match config.on_store_error {
                FailurePolicy::Open => Ok(next.run(request).await),
                FailurePolicy::Closed => Err(StatusCode::INTERNAL_SERVER_ERROR),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::SlidingWindowLimiter;
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use axum::{Router, body::Body, middleware, routing::get};
    use std::time::Duration;
    use tower::ServiceExt;

    struct BrokenLimiter;

    #[async_trait]
    impl Limiter for BrokenLimiter {
        async fn limit(&self, _key: &str) -> StoreResult<bool> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
    }

    fn app(state: IpRateLimit) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, ip_rate_limit))
    }

    fn request_from(peer: &str, forwarded_for: &str) -> Request {
        let peer: SocketAddr = format!("{peer}:40000").parse().unwrap();
        axum::http::Request::builder()
            .uri("/")
            .header("x-forwarded-for", forwarded_for)
            .extension(ConnectInfo(peer))
            .body(Body::empty())
            .unwrap()
    }

    fn limit_two() -> Arc<dyn Limiter> {
        Arc::new(SlidingWindowLimiter::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(60),
            2,
        ))
    }

    #[test]
    fn test_client_ip_uses_peer_unless_proxy_is_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer), false), "127.0.0.1");
        assert_eq!(client_ip(&headers, Some(peer), true), "203.0.113.7");
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer), true), "127.0.0.1");
        assert_eq!(client_ip(&HeaderMap::new(), None, false), "unknown");

        let mut real_ip = HeaderMap::new();
        real_ip.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(client_ip(&real_ip, Some(peer), true), "198.51.100.2");
        assert_eq!(client_ip(&real_ip, Some(peer), false), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_rejects_over_quota() {
        let app = app(IpRateLimit::new(limit_two(), FailurePolicy::Closed));

        for _ in 0..2 {
            let res = app.clone().oneshot(request_from("1.2.3.4", "9.9.9.9")).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
        let res = app.clone().oneshot(request_from("1.2.3.4", "9.9.9.9")).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

        let res = app.oneshot(request_from("5.6.7.8", "9.9.9.9")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_does_not_reset_quota() {
        let app = app(IpRateLimit::new(limit_two(), FailurePolicy::Closed));

        let mut allowed = 0;
        for i in 0..50 {
            let spoofed = format!("10.1.{}.{}", i / 256, i % 256);
            let res = app.clone().oneshot(request_from("1.2.3.4", &spoofed)).await.unwrap();
            if res.status() == StatusCode::OK {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 2);
    }

    #[tokio::test]
    async fn test_trusted_proxy_keys_on_forwarded_for() {
        let state = IpRateLimit::new(limit_two(), FailurePolicy::Closed).trust_proxy_headers(true);
        let app = app(state);

        // Every request arrives from the proxy; the clients behind it differ.
        for client in ["203.0.113.1", "203.0.113.2", "203.0.113.3"] {
            for _ in 0..2 {
                let res = app.clone().oneshot(request_from("10.0.0.1", client)).await.unwrap();
                assert_eq!(res.status(), StatusCode::OK);
            }
        }
        let res = app.oneshot(request_from("10.0.0.1", "203.0.113.1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_store_failure_follows_policy() {
        let closed = app(IpRateLimit::new(Arc::new(BrokenLimiter), FailurePolicy::Closed));
        let res = closed.oneshot(request_from("1.2.3.4", "1.2.3.4")).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let open = app(IpRateLimit::new(Arc::new(BrokenLimiter), FailurePolicy::Open));
        let res = open.oneshot(request_from("1.2.3.4", "1.2.3.4")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
