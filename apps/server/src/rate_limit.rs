use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

/// Route groups, each with its own budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Availability and content reads.
    Public,
    /// Lead submission.
    Lead,
    /// Admin password attempts.
    Login,
    /// Authenticated admin calls.
    Admin,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed within the sliding window.
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// In-memory per-IP sliding-window limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    configs: Arc<HashMap<Tier, RateLimitConfig>>,
    hits: Arc<DashMap<(Tier, IpAddr), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(configs: impl IntoIterator<Item = (Tier, RateLimitConfig)>) -> Self {
        Self {
            configs: Arc::new(configs.into_iter().collect()),
            hits: Arc::new(DashMap::new()),
        }
    }

    /// Production budgets.
    pub fn standard() -> Self {
        Self::new([
            (Tier::Public, RateLimitConfig::new(60, 60)),
            (Tier::Lead, RateLimitConfig::new(5, 300)),
            (Tier::Login, RateLimitConfig::new(10, 300)),
            (Tier::Admin, RateLimitConfig::new(120, 60)),
        ])
    }

    /// `Ok(())` if allowed, `Err(retry_after_secs)` if limited. Tiers without
    /// a config are unlimited.
    pub fn check(&self, tier: Tier, ip: IpAddr) -> Result<(), u64> {
        let Some(config) = self.configs.get(&tier) else {
            return Ok(());
        };
        let now = Instant::now();

        let mut entry = self.hits.entry((tier, ip)).or_default();
        entry.retain(|t| now.duration_since(*t) < config.window);

        if entry.len() >= config.max_requests as usize {
            let oldest = entry[0];
            let retry_after = (oldest + config.window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        entry.push(now);
        Ok(())
    }

    /// Drops entries idle for more than twice their window.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.hits.retain(|(tier, _), timestamps| {
            let cutoff = self
                .configs
                .get(tier)
                .map(|c| c.window * 2)
                .unwrap_or_default();
            timestamps.retain(|t| now.duration_since(*t) < cutoff);
            !timestamps.is_empty()
        });
    }
}

/// Client IP from `X-Forwarded-For` (reverse proxy) or the socket address.
pub fn extract_client_ip(req: &Request) -> IpAddr {
    if let Some(ip) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn too_many_requests(retry_after: u64) -> Response {
    let body = ApiResponse::<()>::error(format!(
        "요청이 너무 많습니다. {}초 후에 다시 시도해주세요",
        retry_after
    ));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

/// Middleware; mount with `from_fn_with_state((limiter, tier), enforce)`.
pub async fn enforce(
    State((limiter, tier)): State<(RateLimiter, Tier)>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check(tier, ip).map_err(|retry_after| {
        tracing::warn!("Rate limited {} on {:?}", ip, tier);
        too_many_requests(retry_after)
    })?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn test_ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn limiter(tier: Tier, max_requests: u32, window: Duration) -> RateLimiter {
        RateLimiter::new([(tier, RateLimitConfig { max_requests, window })])
    }

    #[test]
    fn test_rejects_over_limit_with_retry_after() {
        let limiter = limiter(Tier::Lead, 2, Duration::from_secs(300));
        let ip = test_ip(1);
        assert!(limiter.check(Tier::Lead, ip).is_ok());
        assert!(limiter.check(Tier::Lead, ip).is_ok());
        let retry_after = limiter.check(Tier::Lead, ip).unwrap_err();
        assert!((1..=300).contains(&retry_after));
    }

    #[test]
    fn test_ips_and_tiers_independent() {
        let limiter = RateLimiter::new([
            (Tier::Lead, RateLimitConfig::new(1, 60)),
            (Tier::Login, RateLimitConfig::new(1, 60)),
        ]);
        assert!(limiter.check(Tier::Lead, test_ip(1)).is_ok());
        assert!(limiter.check(Tier::Lead, test_ip(1)).is_err());
        assert!(limiter.check(Tier::Lead, test_ip(2)).is_ok());
        assert!(limiter.check(Tier::Login, test_ip(1)).is_ok());
    }

    #[test]
    fn test_unconfigured_tier_is_unlimited() {
        let limiter = limiter(Tier::Lead, 1, Duration::from_secs(60));
        for _ in 0..10 {
            assert!(limiter.check(Tier::Public, test_ip(1)).is_ok());
        }
    }

    #[test]
    fn test_window_expiry_allows_again() {
        let limiter = limiter(Tier::Login, 1, Duration::from_millis(100));
        let ip = test_ip(1);
        assert!(limiter.check(Tier::Login, ip).is_ok());
        assert!(limiter.check(Tier::Login, ip).is_err());
        sleep(Duration::from_millis(150));
        assert!(limiter.check(Tier::Login, ip).is_ok());
    }

    #[test]
    fn test_cleanup_removes_only_stale_entries() {
        let limiter = RateLimiter::new([
            (Tier::Public, RateLimitConfig { max_requests: 10, window: Duration::from_millis(50) }),
            (Tier::Admin, RateLimitConfig::new(2, 60)),
        ]);
        limiter.check(Tier::Public, test_ip(1)).unwrap();
        limiter.check(Tier::Admin, test_ip(1)).unwrap();

        sleep(Duration::from_millis(120));
        limiter.cleanup();

        assert!(!limiter.hits.contains_key(&(Tier::Public, test_ip(1))));
        limiter.check(Tier::Admin, test_ip(1)).unwrap();
        assert!(limiter.check(Tier::Admin, test_ip(1)).is_err());
    }
}
