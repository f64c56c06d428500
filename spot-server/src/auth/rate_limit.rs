//! Per-client throttling of the public issue routes
//!
//! Each [`PublicRoute`] has its own fixed-window budget per client IP. The
//! client is the TCP peer, unless the peer is one of the configured
//! `TRUSTED_PROXIES`: then the rightmost `X-Forwarded-For` hop that is not a
//! trusted proxy is used. A header sent straight to the server is ignored.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use shared::error::{AppError, ErrorCode};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::state::ServerState;

/// Unauthenticated routes that can mint sessions or probe reporters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublicRoute {
    OtpSend,
    Anonymous,
    Verify,
}

impl PublicRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OtpSend => "otp-send",
            Self::Anonymous => "anonymous",
            Self::Verify => "verify",
        }
    }
}

impl fmt::Display for PublicRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `None` when the peer address is unavailable; such callers share a budget
type ClientKey = Option<IpAddr>;

struct Window {
    count: u32,
    started: Instant,
}

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<(PublicRoute, ClientKey), Window>>,
    trusted_proxies: Arc<[IpAddr]>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, trusted_proxies: Vec<IpAddr>) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            trusted_proxies: trusted_proxies.into(),
            max_requests,
            window,
        }
    }

    /// Count one request; `false` once the client's budget is spent
    pub fn admit(&self, route: PublicRoute, client: ClientKey) -> bool {
        let now = Instant::now();
        let mut window = self.windows.entry((route, client)).or_insert_with(|| Window {
            count: 0,
            started: now,
        });
        if now.duration_since(window.started) >= self.window {
            window.count = 0;
            window.started = now;
        }
        window.count = window.count.saturating_add(1);
        window.count <= self.max_requests
    }

    /// Drop windows that have fully elapsed
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, window| now.duration_since(window.started) < self.window);
    }

    fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.trusted_proxies.contains(ip)
    }

    /// Client address for `request`
    pub fn client_of(&self, request: &Request) -> ClientKey {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())?;
        if !self.is_trusted(&peer) {
            return Some(peer);
        }

        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let hop = forwarded
            .rsplit(',')
            .map_while(|hop| hop.trim().parse::<IpAddr>().ok())
            .find(|ip| !self.is_trusted(ip));
        Some(hop.unwrap_or(peer))
    }
}

/// Middleware for one public route; state is `(ServerState, route)`
pub async fn throttle(
    State((state, route)): State<(ServerState, PublicRoute)>,
    request: Request,
    next: Next,
) -> Response {
    let client = state.rate_limiter.client_of(&request);
    if !state.rate_limiter.admit(route, client) {
        crate::security_log!(WARN, "rate_limited", route = %route, client = ?client);
        return AppError::new(ErrorCode::TooManyRequests).into_response();
    }
    next.run(request).await
}
