//! Sliding-window rate limiting per client IP and endpoint class

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::ip_extractor::{extract_client_ip, TrustedProxies};
use crate::config::RateLimitConfig;
use crate::error::ErrorBody;
use crate::models::{SHORT_CODE_LENGTH, UNKNOWN_IP};

pub const WINDOW: Duration = Duration::from_secs(60);

/// Identifiers idle for this long are dropped by [`RateLimiter::cleanup`]
pub const CLEANUP_MAX_AGE: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    Create,
    Access,
    General,
}

impl EndpointClass {
    /// POSTs create links, GETs ending in a short code access one.
    pub fn classify(method: &Method, path: &str) -> Self {
        let last_segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");

        if method == Method::POST {
            EndpointClass::Create
        } else if method == Method::GET && last_segment.len() == SHORT_CODE_LENGTH {
            EndpointClass::Access
        } else {
            EndpointClass::General
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            EndpointClass::Create => "url_creation",
            EndpointClass::Access => "url_access",
            EndpointClass::General => "general",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    /// Seconds until a slot frees up, set when the request was refused
    pub retry_after: Option<u64>,
}

/// Request timestamps per identifier, trimmed to the window on every check.
pub struct RateLimiter {
    config: RateLimitConfig,
    trusted_proxies: Arc<TrustedProxies>,
    requests: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, trusted_proxies: Arc<TrustedProxies>) -> Self {
        Self {
            config,
            trusted_proxies,
            requests: DashMap::new(),
        }
    }

    pub fn limit_for(&self, class: EndpointClass) -> usize {
        match class {
            EndpointClass::Create => self.config.create_per_minute,
            EndpointClass::Access => self.config.access_per_minute,
            EndpointClass::General => self.config.general_per_minute,
        }
    }

    pub fn check(&self, identifier: &str, limit: usize, window: Duration) -> RateDecision {
        let now = Instant::now();
        let mut entry = self.requests.entry(identifier.to_string()).or_default();
        let timestamps = entry.value_mut();

        while timestamps
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= window)
        {
            timestamps.pop_front();
        }

        let current = timestamps.len();
        if current < limit {
            timestamps.push_back(now);
            return RateDecision {
                allowed: true,
                limit,
                remaining: limit - current - 1,
                retry_after: None,
            };
        }

        let retry_after = timestamps
            .front()
            .map(|oldest| window.saturating_sub(now.duration_since(*oldest)).as_secs())
            .unwrap_or(window.as_secs());

        RateDecision {
            allowed: false,
            limit,
            remaining: 0,
            retry_after: Some(retry_after.max(1)),
        }
    }

    /// Drop identifiers without a request in the last `max_age`, returning
    /// how many were removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.requests.len();
        self.requests.retain(|_, timestamps| {
            timestamps
                .back()
                .is_some_and(|newest| now.duration_since(*newest) < max_age)
        });
        before.saturating_sub(self.requests.len())
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.requests.len()
    }
}

/// Periodically forget idle identifiers until shutdown is signalled.
pub fn spawn_cleanup(
    limiter: Arc<RateLimiter>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = limiter.cleanup(CLEANUP_MAX_AGE);
                    debug!(removed, "rate limiter cleanup completed");
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Rate limiter cleanup stopped");
                        break;
                    }
                }
            }
        }
    })
}

pub async fn enforce_rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client = extract_client_ip(request.headers(), peer, &limiter.trusted_proxies)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string());

    let class = EndpointClass::classify(request.method(), request.uri().path());
    let limit = limiter.limit_for(class);
    let decision = limiter.check(&format!("{client}:{}", class.as_str()), limit, WINDOW);

    if !decision.allowed {
        warn!(
            client = %client,
            endpoint = class.as_str(),
            method = %request.method(),
            path = request.uri().path(),
            "rate limit exceeded"
        );
        let body = ErrorBody::new(
            "rate_limit_exceeded",
            format!("Too many requests. Limit: {limit} per {} seconds", WINDOW.as_secs()),
        );
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        apply_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    let reset = Utc::now().timestamp() + WINDOW.as_secs() as i64;
    let mut set = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    };

    set("x-ratelimit-limit", decision.limit.to_string());
    set("x-ratelimit-remaining", decision.remaining.to_string());
    set("x-ratelimit-reset", reset.to_string());
    set("x-ratelimit-window", WINDOW.as_secs().to_string());
    if let Some(retry_after) = decision.retry_after {
        set("retry-after", retry_after.to_string());
    }
}
