use crate::api::errors::AppError;
use crate::api::AppState;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-client sliding-window rate limiter.
///
/// Each client may make at most `limit` requests in any span of `period`.
/// Only accepted requests are recorded, and a timestamp is forgotten once it
/// is a full period old.
#[derive(Clone)]
pub struct RateLimiter {
    clients: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    limit: u32,
    period: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter.
    /// A limit of 0 disables rate limiting (all requests are allowed).
    pub fn new(limit: u32, period: Duration) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            limit,
            period,
        }
    }

    /// Check if a request from `client` is allowed.
    /// Returns `true` if allowed, `false` if rate-limited.
    pub fn check(&self, client: &str) -> bool {
        self.check_at(client, Instant::now())
    }

    #[allow(clippy::significant_drop_tightening)]
    fn check_at(&self, client: &str, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }

        let mut clients = self.clients.lock();
        let hits = clients.entry(client.to_string()).or_default();
        while hits
            .front()
            .is_some_and(|&hit| now.saturating_duration_since(hit) >= self.period)
        {
            hits.pop_front();
        }

        if hits.len() >= self.limit as usize {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Forget clients with no request in the last period.
    pub fn cleanup(&self) {
        self.cleanup_at(Instant::now());
    }

    fn cleanup_at(&self, now: Instant) {
        self.clients.lock().retain(|_, hits| {
            hits.back()
                .is_some_and(|&hit| now.saturating_duration_since(hit) < self.period)
        });
    }

    fn len(&self) -> usize {
        self.clients.lock().len()
    }
}

/// The per-second and per-minute limits applied together. A request must
/// pass both.
#[derive(Clone)]
pub struct RateLimits {
    per_second: RateLimiter,
    per_minute: RateLimiter,
}

impl RateLimits {
    pub fn new(per_second: u32, per_minute: u32) -> Self {
        Self {
            per_second: RateLimiter::new(per_second, Duration::from_secs(1)),
            per_minute: RateLimiter::new(per_minute, Duration::from_secs(60)),
        }
    }

    pub fn check(&self, client: &str) -> bool {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> bool {
        // Stops at the first limit hit, so a request turned away per second
        // does not use up the minute allowance.
        self.per_second.check_at(client, now) && self.per_minute.check_at(client, now)
    }

    pub fn cleanup(&self) {
        self.per_second.cleanup();
        self.per_minute.cleanup();
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.per_second.len().max(self.per_minute.len())
    }
}

/// Client address used as the rate-limit key.
///
/// Forwarded headers are only consulted when the deployment sits behind a
/// proxy that sets them; otherwise any client could pick its own key.
pub fn client_address(req: &Request, trust_forwarded_for: bool) -> String {
    let headers = req.headers();
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()));
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

/// Reject requests over either limit with 429.
pub async fn limit_requests(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_address(&req, state.trust_forwarded_for);
    if !state.rate_limits.check(&client) {
        tracing::warn!(client = %client, path = %req.uri().path(), "Rate limit exceeded");
        return Err(AppError::TooManyRequests);
    }
    Ok(next.run(req).await)
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    const SECOND: Duration = Duration::from_secs(1);
    const MINUTE: Duration = Duration::from_secs(60);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_disabled_rate_limiter() {
        let rl = RateLimiter::new(0, SECOND);
        assert!(rl.check("10.0.0.1"));
        assert!(rl.check("10.0.0.1"));
    }

    #[test]
    fn test_allows_within_limit() {
        let rl = RateLimiter::new(10, SECOND);
        for _ in 0..10 {
            assert!(rl.check("10.0.0.1"));
        }
    }

    #[test]
    fn test_blocks_over_limit() {
        let rl = RateLimiter::new(2, SECOND);
        assert!(rl.check("10.0.0.1"));
        assert!(rl.check("10.0.0.1"));
        // Third request should be blocked (only 2 per second)
        assert!(!rl.check("10.0.0.1"));
    }

    #[test]
    fn test_separate_client_windows() {
        let rl = RateLimiter::new(1, SECOND);
        assert!(rl.check("10.0.0.1"));
        assert!(rl.check("10.0.0.2"));
        assert!(!rl.check("10.0.0.1"));
        assert!(!rl.check("10.0.0.2"));
    }

    #[test]
    fn test_window_slides() {
        let rl = RateLimiter::new(2, SECOND);
        let base = Instant::now();
        assert!(rl.check_at("c", base));
        assert!(rl.check_at("c", base + ms(400)));
        assert!(!rl.check_at("c", base + ms(900)));
        // The first request has aged out, the second has not.
        assert!(rl.check_at("c", base + ms(1000)));
        assert!(!rl.check_at("c", base + ms(1200)));
        assert!(rl.check_at("c", base + ms(1400)));
    }

    #[test]
    fn test_minute_limit_holds_for_whole_window() {
        let rl = RateLimiter::new(60, MINUTE);
        let base = Instant::now();
        for _ in 0..60 {
            assert!(rl.check_at("10.0.0.1", base));
        }
        assert!(!rl.check_at("10.0.0.1", base + ms(30_000)));
        assert!(!rl.check_at("10.0.0.1", base + ms(59_999)));
        assert!(rl.check_at("10.0.0.1", base + MINUTE));
    }

    #[test]
    fn test_steady_two_per_second_gets_sixty_per_minute() {
        let limits = RateLimits::new(2, 60);
        let base = Instant::now();
        let accepted: Vec<Instant> = (0..240u64)
            .map(|i| base + ms(500 * i))
            .filter(|&at| limits.check_at("c", at))
            .collect();

        let first_minute = accepted.iter().filter(|&&at| at < base + MINUTE).count();
        assert_eq!(first_minute, 60);
        for &start in &accepted {
            let in_window = accepted
                .iter()
                .filter(|&&at| at >= start && at < start + MINUTE)
                .count();
            assert!(in_window <= 60, "{in_window} requests within one minute");
        }
    }

    #[test]
    fn test_rejected_burst_does_not_spend_minute_allowance() {
        let limits = RateLimits::new(2, 60);
        let base = Instant::now();
        let burst = (0..62).filter(|_| limits.check_at("c", base)).count();
        assert_eq!(burst, 2);

        let later = base + ms(1100);
        assert!(limits.check_at("c", later));
        assert!(limits.check_at("c", later));
        assert!(!limits.check_at("c", later));
        assert_eq!(limits.per_minute.clients.lock()["c"].len(), 4);
    }

    #[test]
    fn test_cleanup_keeps_recent_clients() {
        let rl = RateLimiter::new(10, SECOND);
        rl.check("10.0.0.1");
        rl.cleanup();
        assert!(rl.clients.lock().contains_key("10.0.0.1"));
    }

    #[test]
    fn test_cleanup_removes_idle_clients() {
        let rl = RateLimiter::new(2, SECOND);
        let base = Instant::now();
        assert!(rl.check_at("idle", base));
        assert!(rl.check_at("active", base + ms(900)));

        rl.cleanup_at(base + ms(1500));
        let clients = rl.clients.lock();
        assert!(!clients.contains_key("idle"));
        assert!(clients.contains_key("active"));
    }

    #[test]
    fn test_cleanup_after_period_elapses() {
        let limits = RateLimits {
            per_second: RateLimiter::new(1, ms(20)),
            per_minute: RateLimiter::new(5, ms(40)),
        };
        assert!(limits.check("10.0.0.1"));
        assert_eq!(limits.tracked_clients(), 1);

        std::thread::sleep(ms(60));
        limits.cleanup();
        assert_eq!(limits.tracked_clients(), 0);
        assert!(limits.check("10.0.0.1"));
    }

    #[test]
    fn test_rate_limits_combined() {
        let limits = RateLimits::new(2, 3);
        assert!(limits.check("a"));
        assert!(limits.check("a"));
        // Per-second window full
        assert!(!limits.check("a"));
        assert!(limits.check("b"));
        assert_eq!(limits.tracked_clients(), 2);
    }

    #[test]
    fn test_rate_limits_minute_cap() {
        let limits = RateLimits::new(0, 2);
        assert!(limits.check("a"));
        assert!(limits.check("a"));
        assert!(!limits.check("a"));
    }

    fn request_with_headers(headers: &[(&str, &str)]) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 7], 4321))));
        req
    }

    #[test]
    fn test_client_address_uses_peer_by_default() {
        let req = request_with_headers(&[("x-forwarded-for", "203.0.113.9")]);
        assert_eq!(client_address(&req, false), "192.0.2.7");
    }

    #[test]
    fn test_client_address_trusts_forwarded_for() {
        let req = request_with_headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        assert_eq!(client_address(&req, true), "203.0.113.9");

        let req = request_with_headers(&[("x-real-ip", "198.51.100.3")]);
        assert_eq!(client_address(&req, true), "198.51.100.3");

        let req = request_with_headers(&[]);
        assert_eq!(client_address(&req, true), "192.0.2.7");
    }

    #[test]
    fn test_client_address_without_connect_info() {
        let req = axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_address(&req, false), "unknown");
    }
}
