//! Anti-forgery tokens bound to sessions.
//!
//! At most one live token per session. Tokens have a fixed lifetime from
//! minting and are rotated after every accepted state-changing request, so a
//! token that has been spent once is never accepted again.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::security::sweeper::Sweep;
use crate::security::token::{constant_time_eq, generate_token};

/// Header a client may use to present its token.
pub const X_CSRF_TOKEN: &str = "x-csrf-token";
/// Response header carrying the replacement token after rotation.
pub const X_NEW_CSRF_TOKEN: &str = "x-new-csrf-token";
/// JSON body field accepted when the header is absent.
pub const CSRF_BODY_FIELD: &str = "csrfToken";

#[derive(Debug, Clone)]
pub struct CsrfTokenRecord {
    pub session_id: String,
    pub token: String,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl CsrfTokenRecord {
    fn mint(session_id: &str, now: Instant, ttl: Duration) -> Self {
        Self {
            session_id: session_id.to_string(),
            token: generate_token(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

pub struct CsrfRegistry {
    tokens: DashMap<String, CsrfTokenRecord>,
    ttl: Duration,
}

impl CsrfRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: DashMap::new(),
            ttl,
        }
    }

    /// Return the session's live token, minting one if there is none.
    pub fn issue(&self, session_id: &str) -> String {
        let now = Instant::now();
        match self.tokens.entry(session_id.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_expired(now) {
                    slot.insert(CsrfTokenRecord::mint(session_id, now, self.ttl));
                }
                slot.get().token.clone()
            }
            Entry::Vacant(slot) => slot
                .insert(CsrfTokenRecord::mint(session_id, now, self.ttl))
                .token
                .clone(),
        }
    }

    /// Check `provided` against the session's current token.
    ///
    /// Expired tokens are evicted and never match.
    pub fn validate(&self, session_id: &str, provided: &str) -> bool {
        let now = Instant::now();
        let Some(record) = self.tokens.get(session_id) else {
            return false;
        };
        if record.is_expired(now) {
            drop(record);
            self.tokens.remove_if(session_id, |_, r| r.is_expired(now));
            return false;
        }
        constant_time_eq(record.token.as_bytes(), provided.as_bytes())
    }

    /// Replace the session's token unconditionally.
    pub fn rotate(&self, session_id: &str) -> String {
        let record = CsrfTokenRecord::mint(session_id, Instant::now(), self.ttl);
        let token = record.token.clone();
        self.tokens.insert(session_id.to_string(), record);
        token
    }

    /// Validate and, on success, rotate under one entry lock.
    ///
    /// Two requests racing with the same token cannot both be accepted.
    pub fn validate_and_rotate(&self, session_id: &str, provided: &str) -> Option<String> {
        let now = Instant::now();
        let mut record = self.tokens.get_mut(session_id)?;
        if record.is_expired(now) {
            drop(record);
            self.tokens.remove_if(session_id, |_, r| r.is_expired(now));
            return None;
        }
        if !constant_time_eq(record.token.as_bytes(), provided.as_bytes()) {
            return None;
        }
        *record = CsrfTokenRecord::mint(session_id, now, self.ttl);
        Some(record.token.clone())
    }

    pub fn remove(&self, session_id: &str) {
        self.tokens.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Sweep for CsrfRegistry {
    fn name(&self) -> &'static str {
        "csrf"
    }

    fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.tokens.len();
        self.tokens.retain(|_, record| !record.is_expired(now));
        before.saturating_sub(self.tokens.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const TTL: Duration = Duration::from_secs(30 * 60);

    #[tokio::test(start_paused = true)]
    async fn test_issue_is_idempotent() {
        let registry = CsrfRegistry::new(TTL);
        let t1 = registry.issue("s1");
        let t2 = registry.issue("s1");
        assert_eq!(t1, t2);
        assert_ne!(registry.issue("s2"), t1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_replaces_expired_token() {
        let registry = CsrfRegistry::new(TTL);
        let t1 = registry.issue("s1");
        advance(TTL + Duration::from_secs(1)).await;
        assert_ne!(registry.issue("s1"), t1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate() {
        let registry = CsrfRegistry::new(TTL);
        assert!(!registry.validate("s1", "anything"));

        let token = registry.issue("s1");
        assert!(registry.validate("s1", &token));
        assert!(!registry.validate("s1", "wrong"));
        assert!(!registry.validate("s2", &token));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotated_token_is_rejected() {
        let registry = CsrfRegistry::new(TTL);
        let t1 = registry.issue("s1");
        let t2 = registry.rotate("s1");

        assert_ne!(t1, t2);
        assert!(!registry.validate("s1", &t1));
        assert!(registry.validate("s1", &t2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_and_rotate_rejects_replay() {
        let registry = CsrfRegistry::new(TTL);
        let t1 = registry.issue("s1");

        let t2 = registry.validate_and_rotate("s1", &t1).unwrap();
        assert_ne!(t1, t2);
        assert!(registry.validate_and_rotate("s1", &t1).is_none());
        assert!(registry.validate_and_rotate("s1", &t2).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_is_fixed() {
        let registry = CsrfRegistry::new(TTL);
        let token = registry.issue("s1");

        // Validation does not extend the lifetime.
        advance(TTL - Duration::from_secs(1)).await;
        assert!(registry.validate("s1", &token));
        advance(Duration::from_secs(2)).await;
        assert!(!registry.validate("s1", &token));
        assert!(registry.is_empty(), "expired token is evicted");
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_sweep() {
        let registry = CsrfRegistry::new(TTL);
        let token = registry.issue("s1");
        registry.remove("s1");
        assert!(!registry.validate("s1", &token));

        registry.issue("old");
        advance(Duration::from_secs(20 * 60)).await;
        registry.issue("new");
        advance(Duration::from_secs(11 * 60)).await;

        assert_eq!(registry.sweep_expired(), 1);
        assert_eq!(registry.len(), 1);
    }
}
