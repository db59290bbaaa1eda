//! API error taxonomy and its HTTP mapping.
//!
//! Security rejections are always 4xx. Only `Internal` maps to 500, and its
//! detail is logged server-side, never sent to the client.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::security::rate_limit::RateLimitDecision;
use crate::security::to_wall_clock;
use crate::users::{PasswordError, UserError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Session is missing, invalid or expired")]
    SessionInvalid,

    #[error("CSRF token missing")]
    CsrfMissing,

    #[error("CSRF token invalid or expired")]
    CsrfInvalid,

    #[error("Too many attempts. Please try again in {wait_minutes} minute(s)")]
    RateLimited {
        retry_after: DateTime<Utc>,
        wait_minutes: u64,
    },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Build the 429 for a denied decision.
    pub fn rate_limited(decision: &RateLimitDecision) -> Self {
        let wait = decision.retry_after();
        let retry_after = decision
            .reset_at
            .map(to_wall_clock)
            .unwrap_or_else(Utc::now);
        // Round up so a client never retries a moment too early.
        let wait_minutes = wait.as_secs().div_ceil(60).max(1);
        ApiError::RateLimited {
            retry_after,
            wait_minutes,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionInvalid | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::CsrfMissing | ApiError::CsrfInvalid => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_minutes: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let (retry_after, wait_minutes) = match &self {
            ApiError::RateLimited {
                retry_after,
                wait_minutes,
            } => (Some(*retry_after), Some(*wait_minutes)),
            _ => (None, None),
        };

        let body = ErrorBody {
            success: false,
            error,
            retry_after,
            wait_minutes,
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<UserError> for ApiError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::EmailTaken => ApiError::Conflict(e.to_string()),
            UserError::NotFound => ApiError::SessionInvalid,
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(e: PasswordError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(e.to_string())
    }
}
