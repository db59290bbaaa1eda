//! Configuration validation.
//!
//! Semantic checks that serde cannot express: value ranges, parseable
//! addresses, placeholder secrets. Returns all errors, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{GuardConfig, LimitPolicy};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    if config.session.expiry_secs == 0 {
        errors.push(ValidationError::new("session.expiry_secs", "must be > 0"));
    }
    if config.session.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("session.sweep_interval_secs", "must be > 0"));
    }
    if config.session.cookie_name.is_empty()
        || !config
            .session
            .cookie_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        errors.push(ValidationError::new(
            "session.cookie_name",
            "must be non-empty and contain only [A-Za-z0-9_-]",
        ));
    }

    if config.csrf.ttl_secs == 0 {
        errors.push(ValidationError::new("csrf.ttl_secs", "must be > 0"));
    }
    if config.csrf.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("csrf.sweep_interval_secs", "must be > 0"));
    }

    if config.rate_limit.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.sweep_interval_secs", "must be > 0"));
    }
    check_policy("rate_limit.login", &config.rate_limit.login, &mut errors);
    check_policy("rate_limit.register", &config.rate_limit.register, &mut errors);

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled && config.admin.api_key.len() < 16 {
        errors.push(ValidationError::new("admin.api_key", "must be at least 16 characters"));
    }
    if config.is_production()
        && config.admin.enabled
        && config.admin.api_key == "CHANGE_ME_IN_PRODUCTION"
    {
        errors.push(ValidationError::new("admin.api_key", "placeholder key in production"));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_policy(prefix: &str, policy: &LimitPolicy, errors: &mut Vec<ValidationError>) {
    if policy.window_secs == 0 {
        errors.push(ValidationError::new(format!("{prefix}.window_secs"), "must be > 0"));
    }
    if policy.max_attempts == 0 {
        errors.push(ValidationError::new(format!("{prefix}.max_attempts"), "must be > 0"));
    }
    if policy.block_secs == 0 {
        errors.push(ValidationError::new(format!("{prefix}.block_secs"), "must be > 0"));
    }
}
