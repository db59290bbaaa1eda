//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client attempt limits on auth routes)
//!     → session.rs (cookie → session record, sliding expiry)
//!     → csrf.rs (token check + rotation on state-changing routes)
//!     → handler
//!     → headers.rs (security response headers)
//! ```
//!
//! # Design Decisions
//! - Registries are explicit service objects owned by `Registries`, not globals
//! - All maps are `DashMap`; check-then-write sequences hold one entry lock
//! - Expiry is enforced on access; sweeper.rs only bounds memory
//! - Fail closed: reject on any security check failure

pub mod csrf;
pub mod headers;
pub mod rate_limit;
pub mod session;
pub mod sweeper;
pub mod token;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

use crate::config::GuardConfig;
use self::csrf::CsrfRegistry;
use self::rate_limit::RateLimiter;
use self::session::SessionRegistry;
use self::sweeper::Sweepers;

/// Map a monotonic instant onto the wall clock, relative to now.
pub fn to_wall_clock(at: Instant) -> DateTime<Utc> {
    let now = Instant::now();
    let wall = Utc::now();
    if at >= now {
        wall + TimeDelta::from_std(at - now).unwrap_or_else(|_| TimeDelta::zero())
    } else {
        wall - TimeDelta::from_std(now - at).unwrap_or_else(|_| TimeDelta::zero())
    }
}

/// The process-local security registries, built once and shared via `Arc`.
#[derive(Clone)]
pub struct Registries {
    pub sessions: Arc<SessionRegistry>,
    pub csrf: Arc<CsrfRegistry>,
    pub login_limiter: Arc<RateLimiter>,
    pub register_limiter: Arc<RateLimiter>,
}

impl Registries {
    pub fn from_config(config: &GuardConfig) -> Self {
        let limits = &config.rate_limit;
        let limiter = |name, policy| {
            if limits.enabled {
                Arc::new(RateLimiter::new(name, policy))
            } else {
                Arc::new(RateLimiter::disabled(name, policy))
            }
        };

        Self {
            sessions: Arc::new(SessionRegistry::new(config.session.expiry())),
            csrf: Arc::new(CsrfRegistry::new(config.csrf.ttl())),
            login_limiter: limiter("login", limits.login),
            register_limiter: limiter("register", limits.register),
        }
    }

    /// Start the background sweep for every registry.
    pub fn spawn_sweepers(&self, config: &GuardConfig) -> Sweepers {
        let mut sweepers = Sweepers::new();
        sweepers.spawn(self.sessions.clone(), config.session.sweep_interval());
        sweepers.spawn(self.csrf.clone(), config.csrf.sweep_interval());
        if config.rate_limit.enabled {
            sweepers.spawn(self.login_limiter.clone(), config.rate_limit.sweep_interval());
            sweepers.spawn(self.register_limiter.clone(), config.rate_limit.sweep_interval());
        }
        sweepers
    }
}
