//! User directory.
//!
//! Stands in for the backend's user repository: the security edge only needs
//! lookup by id and email, registration, and a profile update.

pub mod password;

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

pub use password::{hash_password, verify_password, PasswordError};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_DISPLAY_NAME_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct User {
    pub id: u64,
    pub uuid: Uuid,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// The parts of a [`User`] that are safe to return to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: u64,
    pub uuid: Uuid,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            uuid: user.uuid,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("email is already registered")]
    EmailTaken,
    #[error("user not found")]
    NotFound,
}

pub trait UserDirectory: Send + Sync {
    fn find_by_id(&self, id: u64) -> Option<User>;

    /// `email` is normalised before lookup.
    fn find_by_email(&self, email: &str) -> Option<User>;

    fn insert(&self, email: &str, display_name: &str, password_hash: String) -> Result<User, UserError>;

    fn update_display_name(&self, id: u64, display_name: &str) -> Result<User, UserError>;

    fn count(&self) -> usize;
}

/// Trim and lower-case an email so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Loose shape check: one `@`, something on both sides, a dot in the domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<u64, User>,
    by_email: DashMap<String, u64>,
    next_id: AtomicU64,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_by_id(&self, id: u64) -> Option<User> {
        self.users.get(&id).map(|u| u.value().clone())
    }

    fn find_by_email(&self, email: &str) -> Option<User> {
        let id = *self.by_email.get(&normalize_email(email))?;
        self.find_by_id(id)
    }

    fn insert(&self, email: &str, display_name: &str, password_hash: String) -> Result<User, UserError> {
        let email = normalize_email(email);
        match self.by_email.entry(email.clone()) {
            Entry::Occupied(_) => Err(UserError::EmailTaken),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                let user = User {
                    id,
                    uuid: Uuid::new_v4(),
                    email,
                    display_name: display_name.trim().to_string(),
                    password_hash,
                    created_at: Utc::now(),
                };
                self.users.insert(id, user.clone());
                slot.insert(id);
                Ok(user)
            }
        }
    }

    fn update_display_name(&self, id: u64, display_name: &str) -> Result<User, UserError> {
        let mut user = self.users.get_mut(&id).ok_or(UserError::NotFound)?;
        user.display_name = display_name.trim().to_string();
        Ok(user.clone())
    }

    fn count(&self) -> usize {
        self.users.len()
    }
}
