//! Fixed-window attempt limiting with cooldown blocks.
//!
//! One [`RateLimiter`] exists per protected action (login, registration).
//! Every attempt is counted up front; handlers call
//! [`RateLimiter::record_success`] when the action succeeds, which clears the
//! client's history.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::LimitPolicy;
use crate::http::context::{RateLimitOutcome, RequestContext};
use crate::http::error::ApiError;
use crate::observability::metrics;
use crate::security::sweeper::Sweep;
use crate::security::to_wall_clock;

/// Bucket shared by every client that carries no identifying header.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Forwarded-address headers, in the order they are trusted.
const CLIENT_KEY_HEADERS: [&str; 4] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip", "x-client-ip"];

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Derive the limiter key for a request.
///
/// Falls back to [`UNKNOWN_CLIENT`], so all anonymous clients share one bucket.
pub fn client_key(headers: &HeaderMap) -> String {
    CLIENT_KEY_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        // x-forwarded-for is a list; the first hop is the client.
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// One client's attempt history in the current window.
#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: Instant,
    blocked: bool,
    block_expires_at: Option<Instant>,
}

impl RateLimitEntry {
    fn first_attempt(now: Instant, policy: &LimitPolicy) -> Self {
        Self {
            count: 1,
            window_reset_at: now + policy.window(),
            blocked: false,
            block_expires_at: None,
        }
    }

    /// The instant the current block lifts, if the client is still blocked.
    fn active_block(&self, now: Instant) -> Option<Instant> {
        match (self.blocked, self.block_expires_at) {
            (true, Some(until)) if now < until => Some(until),
            _ => None,
        }
    }

    fn record(&mut self, now: Instant, policy: &LimitPolicy) -> RateLimitDecision {
        if let Some(until) = self.active_block(now) {
            return RateLimitDecision::denied(policy.max_attempts, until);
        }

        // Elapsed window or lifted block: start over.
        if self.blocked || now > self.window_reset_at {
            *self = Self::first_attempt(now, policy);
            return RateLimitDecision::allowed(policy.max_attempts, policy.max_attempts - 1, self.window_reset_at);
        }

        self.count = self.count.saturating_add(1);
        if self.count > policy.max_attempts {
            let until = now + policy.block_duration();
            self.blocked = true;
            self.block_expires_at = Some(until);
            return RateLimitDecision::denied(policy.max_attempts, until);
        }

        RateLimitDecision::allowed(policy.max_attempts, policy.max_attempts - self.count, self.window_reset_at)
    }

    fn is_stale(&self, now: Instant) -> bool {
        let window_over = now > self.window_reset_at;
        let block_over = self.block_expires_at.map_or(true, |until| now >= until);
        window_over && block_over
    }
}

/// Result of [`RateLimiter::check_and_record_attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: Option<u32>,
    /// End of the window when allowed, end of the block when denied.
    pub reset_at: Option<Instant>,
}

impl RateLimitDecision {
    fn allowed(limit: u32, remaining: u32, reset_at: Instant) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: Some(remaining),
            reset_at: Some(reset_at),
        }
    }

    fn denied(limit: u32, until: Instant) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: Some(0),
            reset_at: Some(until),
        }
    }

    /// Time left until `reset_at`, zero when already past.
    pub fn retry_after(&self) -> Duration {
        self.reset_at
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }

    /// Write the `X-RateLimit-*` headers for this decision.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        if let Some(remaining) = self.remaining {
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
        }
        if let Some(reset_at) = self.reset_at {
            if let Ok(value) = HeaderValue::from_str(&to_wall_clock(reset_at).to_rfc3339()) {
                headers.insert(X_RATELIMIT_RESET, value);
            }
        }
    }
}

/// Snapshot for the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RateLimitStats {
    pub tracked: usize,
    pub blocked: usize,
}

/// Per-client attempt registry for one action.
pub struct RateLimiter {
    name: &'static str,
    policy: LimitPolicy,
    enabled: bool,
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new(name: &'static str, policy: LimitPolicy) -> Self {
        Self {
            name,
            policy,
            enabled: true,
            entries: DashMap::new(),
        }
    }

    /// A limiter that lets every attempt through without tracking it.
    pub fn disabled(name: &'static str, policy: LimitPolicy) -> Self {
        Self {
            enabled: false,
            ..Self::new(name, policy)
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> &LimitPolicy {
        &self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Count an attempt for `client_key` and decide whether it may proceed.
    pub fn check_and_record_attempt(&self, client_key: &str) -> RateLimitDecision {
        let now = Instant::now();
        match self.entries.entry(client_key.to_string()) {
            Entry::Vacant(slot) => {
                let entry = slot.insert(RateLimitEntry::first_attempt(now, &self.policy));
                RateLimitDecision::allowed(
                    self.policy.max_attempts,
                    self.policy.max_attempts - 1,
                    entry.window_reset_at,
                )
            }
            Entry::Occupied(mut slot) => {
                let was_blocked = slot.get().active_block(now).is_some();
                let decision = slot.get_mut().record(now, &self.policy);
                if !decision.allowed && !was_blocked {
                    tracing::warn!(
                        limiter = self.name,
                        client = %client_key,
                        block_secs = self.policy.block_secs,
                        "Client blocked after too many attempts"
                    );
                }
                decision
            }
        }
    }

    /// Forget everything about `client_key`; the next attempt is a first attempt.
    pub fn record_success(&self, client_key: &str) {
        self.entries.remove(client_key);
    }

    pub fn stats(&self) -> RateLimitStats {
        let now = Instant::now();
        let blocked = self
            .entries
            .iter()
            .filter(|e| e.value().active_block(now).is_some())
            .count();
        RateLimitStats {
            tracked: self.entries.len(),
            blocked,
        }
    }
}

impl Sweep for RateLimiter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_stale(now));
        before.saturating_sub(self.entries.len())
    }
}

/// Middleware that counts an attempt against the limiter in state.
///
/// Rejected clients get 429 without reaching the handler. Allowed requests
/// carry the decision in their [`RequestContext`] so the handler can report
/// success, and the response gets `X-RateLimit-*` headers.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let key = client_key(request.headers());
    let decision = limiter.check_and_record_attempt(&key);

    if !decision.allowed {
        tracing::warn!(limiter = limiter.name(), client = %key, "Rate limit exceeded");
        metrics::record_rate_limited(limiter.name());
        let mut response = ApiError::rate_limited(&decision).into_response();
        decision.apply_headers(response.headers_mut());
        return response;
    }

    RequestContext::attach(&mut request).rate_limit = Some(RateLimitOutcome {
        client_key: key,
        decision,
    });

    let mut response = next.run(request).await;
    decision.apply_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn login() -> RateLimiter {
        RateLimiter::new("login", LimitPolicy::login())
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_allowed_then_blocked() {
        let limiter = login();
        for i in 0..5 {
            let d = limiter.check_and_record_attempt("10.0.0.1");
            assert!(d.allowed, "attempt {} should pass", i + 1);
            assert_eq!(d.remaining, Some(4 - i));
        }

        let sixth = limiter.check_and_record_attempt("10.0.0.1");
        assert!(!sixth.allowed);
        assert_eq!(sixth.retry_after(), Duration::from_secs(300));
        assert_eq!(limiter.stats(), RateLimitStats { tracked: 1, blocked: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_attempts_do_not_extend_block() {
        let limiter = login();
        for _ in 0..6 {
            limiter.check_and_record_attempt("k");
        }
        advance(Duration::from_secs(120)).await;
        let d = limiter.check_and_record_attempt("k");
        assert!(!d.allowed);
        assert_eq!(d.retry_after(), Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_window_after_block_expires() {
        let limiter = login();
        for _ in 0..6 {
            limiter.check_and_record_attempt("k");
        }
        advance(Duration::from_secs(300)).await;

        let d = limiter.check_and_record_attempt("k");
        assert!(d.allowed);
        assert_eq!(d.remaining, Some(4));
        assert_eq!(limiter.stats().blocked, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_elapse_resets_count() {
        let limiter = login();
        for _ in 0..4 {
            limiter.check_and_record_attempt("k");
        }
        // Exactly at the reset instant the window is still open.
        advance(Duration::from_secs(300)).await;
        assert_eq!(limiter.check_and_record_attempt("k").remaining, Some(0));

        advance(Duration::from_millis(1)).await;
        assert_eq!(limiter.check_and_record_attempt("k").remaining, Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_success_resets() {
        let limiter = login();
        for _ in 0..6 {
            limiter.check_and_record_attempt("k");
        }
        limiter.record_success("k");

        let d = limiter.check_and_record_attempt("k");
        assert!(d.allowed);
        assert_eq!(d.remaining, Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_independent() {
        let limiter = RateLimiter::new("register", LimitPolicy::register());
        for _ in 0..4 {
            limiter.check_and_record_attempt("a");
        }
        assert!(!limiter.check_and_record_attempt("a").allowed);
        assert!(limiter.check_and_record_attempt("b").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_live_entries() {
        let limiter = login();
        for _ in 0..6 {
            limiter.check_and_record_attempt("blocked");
        }
        limiter.check_and_record_attempt("idle");

        advance(Duration::from_secs(301)).await;
        limiter.check_and_record_attempt("fresh");

        // "blocked" and "idle" have both windows and blocks behind them.
        assert_eq!(limiter.sweep_expired(), 2);
        assert_eq!(limiter.stats().tracked, 1);
    }

    #[test]
    fn test_client_key_priority() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers), UNKNOWN_CLIENT);

        headers.insert("x-client-ip", HeaderValue::from_static("4.4.4.4"));
        headers.insert("x-real-ip", HeaderValue::from_static("2.2.2.2"));
        assert_eq!(client_key(&headers), "2.2.2.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 1.1.1.1 , 10.0.0.1"));
        assert_eq!(client_key(&headers), "1.1.1.1");
    }

    #[test]
    fn test_empty_forwarded_header_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));
        headers.insert("cf-connecting-ip", HeaderValue::from_static("3.3.3.3"));
        assert_eq!(client_key(&headers), "3.3.3.3");
    }
}
