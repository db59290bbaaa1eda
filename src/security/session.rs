//! Server-side session registry with sliding expiration.
//!
//! A session is valid while it has been idle for less than the configured
//! expiry. Every successful [`SessionRegistry::get`] refreshes the idle
//! clock. Ids are 256-bit random tokens and double as the cookie value.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::observability::metrics;
use crate::security::sweeper::Sweep;
use crate::security::token::generate_token;

/// Who a session belongs to and where it was opened from.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: u64,
    pub user_uuid: Uuid,
    pub email: String,
    pub ip_address: String,
    pub user_agent: String,
}

/// One authenticated browsing session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: u64,
    pub user_uuid: Uuid,
    /// Copy of the user's email when the session was opened.
    pub email: String,
    pub created_at: Instant,
    pub last_activity_at: Instant,
    /// Wall-clock login time, for display.
    pub logged_in_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
}

impl SessionRecord {
    fn is_expired(&self, now: Instant, expiry: Duration) -> bool {
        now.saturating_duration_since(self.last_activity_at) >= expiry
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub active: usize,
}

pub struct SessionRegistry {
    sessions: DashMap<String, SessionRecord>,
    expiry: Duration,
}

impl SessionRegistry {
    pub fn new(expiry: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            expiry,
        }
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Store a new session and return its id.
    pub fn create(&self, new: NewSession) -> String {
        let now = Instant::now();
        let session_id = generate_token();
        let record = SessionRecord {
            session_id: session_id.clone(),
            user_id: new.user_id,
            user_uuid: new.user_uuid,
            email: new.email,
            created_at: now,
            last_activity_at: now,
            logged_in_at: Utc::now(),
            ip_address: new.ip_address,
            user_agent: new.user_agent,
        };

        tracing::debug!(user_id = record.user_id, ip = %record.ip_address, "Session created");
        self.sessions.insert(session_id.clone(), record);
        metrics::record_sessions(self.sessions.len());
        session_id
    }

    /// Look a session up, refreshing its activity time.
    ///
    /// Returns `None` for unknown ids and for sessions idle for `expiry` or
    /// longer; the latter are evicted.
    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        let now = Instant::now();
        let mut entry = self.sessions.get_mut(session_id)?;
        if entry.is_expired(now, self.expiry) {
            drop(entry);
            let expiry = self.expiry;
            self.sessions
                .remove_if(session_id, |_, record| record.is_expired(now, expiry));
            tracing::debug!("Session expired on lookup");
            return None;
        }
        entry.last_activity_at = now;
        Some(entry.clone())
    }

    /// Replace `old_session_id` with a freshly minted id.
    ///
    /// Called right after login so an id planted before authentication never
    /// becomes an authenticated one.
    pub fn regenerate(&self, old_session_id: Option<&str>, new: NewSession) -> String {
        if let Some(old) = old_session_id {
            if self.sessions.remove(old).is_some() {
                tracing::debug!("Previous session discarded on regenerate");
            }
        }
        self.create(new)
    }

    /// Remove a session. Returns whether it existed.
    pub fn destroy(&self, session_id: &str) -> bool {
        let existed = self.sessions.remove(session_id).is_some();
        metrics::record_sessions(self.sessions.len());
        existed
    }

    pub fn stats(&self) -> SessionStats {
        let now = Instant::now();
        let active = self
            .sessions
            .iter()
            .filter(|r| !r.value().is_expired(now, self.expiry))
            .count();
        SessionStats {
            total: self.sessions.len(),
            active,
        }
    }
}

impl Sweep for SessionRegistry {
    fn name(&self) -> &'static str {
        "sessions"
    }

    fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expiry = self.expiry;
        let before = self.sessions.len();
        self.sessions.retain(|_, record| !record.is_expired(now, expiry));
        let after = self.sessions.len();
        metrics::record_sessions(after);
        before.saturating_sub(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const EXPIRY: Duration = Duration::from_secs(30 * 60);

    fn alice() -> NewSession {
        NewSession {
            user_id: 7,
            user_uuid: Uuid::new_v4(),
            email: "alice@example.com".into(),
            ip_address: "10.0.0.1".into(),
            user_agent: "test-agent".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_create() {
        let registry = SessionRegistry::new(EXPIRY);
        let id = registry.create(alice());

        let record = registry.get(&id).unwrap();
        assert_eq!(record.session_id, id);
        assert_eq!(record.user_id, 7);
        assert_eq!(record.email, "alice@example.com");
        assert_eq!(record.last_activity_at, Instant::now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_slides_expiry() {
        let registry = SessionRegistry::new(EXPIRY);
        let id = registry.create(alice());

        advance(Duration::from_secs(20 * 60)).await;
        let touched = registry.get(&id).unwrap();
        assert_eq!(touched.last_activity_at, Instant::now());

        // 40 minutes after creation but only 20 idle.
        advance(Duration::from_secs(20 * 60)).await;
        assert!(registry.get(&id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_exactly_at_expiry() {
        let registry = SessionRegistry::new(EXPIRY);
        let id = registry.create(alice());

        advance(EXPIRY - Duration::from_millis(1)).await;
        assert!(registry.get(&id).is_some());

        advance(EXPIRY).await;
        assert!(registry.get(&id).is_none());
        assert_eq!(registry.stats().total, 0, "expired session is evicted on lookup");
    }

    #[tokio::test(start_paused = true)]
    async fn test_regenerate_invalidates_old_id() {
        let registry = SessionRegistry::new(EXPIRY);
        let old = registry.create(alice());
        let new = registry.regenerate(Some(&old), alice());

        assert_ne!(old, new);
        assert!(registry.get(&old).is_none());
        assert!(registry.get(&new).is_some());
        assert_eq!(registry.stats().total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_regenerate_without_old_session_creates() {
        let registry = SessionRegistry::new(EXPIRY);
        let id = registry.regenerate(Some("never-issued"), alice());
        assert!(registry.get(&id).is_some());

        let other = registry.regenerate(None, alice());
        assert!(registry.get(&other).is_some());
        assert_eq!(registry.stats().total, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy() {
        let registry = SessionRegistry::new(EXPIRY);
        let id = registry.create(alice());
        assert!(registry.destroy(&id));
        assert!(!registry.destroy(&id));
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_and_sweep() {
        let registry = SessionRegistry::new(EXPIRY);
        registry.create(alice());
        advance(Duration::from_secs(20 * 60)).await;
        let live = registry.create(alice());
        advance(Duration::from_secs(15 * 60)).await;

        assert_eq!(registry.stats(), SessionStats { total: 2, active: 1 });
        assert_eq!(registry.sweep_expired(), 1);
        assert_eq!(registry.stats(), SessionStats { total: 1, active: 1 });
        assert!(registry.get(&live).is_some());
    }
}
