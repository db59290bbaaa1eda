use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::{Environment, LimitPolicy};
use crate::http::server::AppState;
use crate::security::rate_limit::{RateLimitStats, RateLimiter};
use crate::security::session::SessionStats;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub environment: Environment,
    pub uptime_secs: u64,
    pub users: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(flatten)]
    pub sessions: SessionStats,
    pub csrf_tokens: usize,
    pub expiry_secs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterSummary {
    pub enabled: bool,
    pub policy: LimitPolicy,
    #[serde(flatten)]
    pub stats: RateLimitStats,
}

impl From<&RateLimiter> for LimiterSummary {
    fn from(limiter: &RateLimiter) -> Self {
        Self {
            enabled: limiter.is_enabled(),
            policy: *limiter.policy(),
            stats: limiter.stats(),
        }
    }
}

#[derive(Serialize)]
pub struct RateLimitSummary {
    pub login: LimiterSummary,
    pub register: LimiterSummary,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        environment: state.config.environment,
        uptime_secs: state.started_at.elapsed().as_secs(),
        users: state.users.count(),
    })
}

pub async fn get_sessions(State(state): State<AppState>) -> Json<SessionSummary> {
    Json(SessionSummary {
        sessions: state.registries.sessions.stats(),
        csrf_tokens: state.registries.csrf.len(),
        expiry_secs: state.config.session.expiry_secs,
    })
}

pub async fn get_rate_limits(State(state): State<AppState>) -> Json<RateLimitSummary> {
    Json(RateLimitSummary {
        login: LimiterSummary::from(state.registries.login_limiter.as_ref()),
        register: LimiterSummary::from(state.registries.register_limiter.as_ref()),
    })
}
