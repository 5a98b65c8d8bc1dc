//! Session state, its owner, and the token lifecycle that keeps it valid.
//!
//! Flow Overview:
//! 1. `AuthProvider::initialize` asks the `TokenManager` to restore a persisted
//!    token exactly once; the session reports `loading` meanwhile.
//! 2. A restored token is validated against the backend and a refresh is
//!    scheduled before it expires.
//! 3. `login` and `logout` bump the session generation so any in-flight
//!    restore/refresh result becomes stale and is discarded.
//! 4. Consumers read the session through `AuthContext` and never mutate it.
//!
//! Token material is wrapped in `SecretString` and must never be logged.

pub mod backend;
mod error;
pub mod manager;
pub mod provider;
pub mod storage;
mod store;

pub use backend::{AuthBackend, HttpBackend};
pub use error::{Error, Result};
pub use manager::{RefreshOutcome, RefreshPolicy, TokenManager};
pub use provider::{AuthContext, AuthProvider};
pub use storage::{FileStorage, MemoryStorage, TokenStorage};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Role attached to a dashboard account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Editor,
    #[serde(other)]
    Viewer,
}

/// Minimal identity projection of a validated token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: u64,
    pub email: String,
    pub role: Role,
}

/// Bearer credential with an absolute expiry (unix seconds).
#[derive(Clone)]
pub struct Token {
    access: SecretString,
    refresh: Option<SecretString>,
    expires_at: u64,
}

impl Token {
    #[must_use]
    pub fn new(access: String, refresh: Option<String>, expires_at: u64) -> Self {
        Self {
            access: SecretString::from(access),
            refresh: refresh.map(SecretString::from),
            expires_at,
        }
    }

    /// Builds a token that expires `expires_in` seconds from now.
    #[must_use]
    pub fn expiring_in(access: String, refresh: Option<String>, expires_in: u64) -> Self {
        Self::new(access, refresh, now_unix().saturating_add(expires_in))
    }

    #[must_use]
    pub fn access(&self) -> &SecretString {
        &self.access
    }

    #[must_use]
    pub fn refresh(&self) -> Option<&SecretString> {
        self.refresh.as_ref()
    }

    #[must_use]
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }

    /// Lifetime left at `now`, zero once expired.
    #[must_use]
    pub fn remaining(&self, now: u64) -> Duration {
        Duration::from_secs(self.expires_at.saturating_sub(now))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access", &"[REDACTED]")
            .field("refresh", &self.refresh.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Login form input.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(email: &str, password: SecretString) -> Self {
        Self {
            email: email.trim().to_string(),
            password,
        }
    }
}

/// What the backend hands out on login and refresh.
#[derive(Clone, Debug)]
pub struct Grant {
    pub token: Token,
    pub user: UserIdentity,
}

/// In-memory record of the current authentication status.
///
/// `user.is_some()` implies `token.is_some()` and `initialized`.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub token: Option<Token>,
    pub user: Option<UserIdentity>,
    pub initialized: bool,
    pub loading: bool,
}

impl Session {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// A missing user does not mean "signed out" yet.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.loading || !self.initialized
    }

    #[must_use]
    pub fn is_known_unauthenticated(&self) -> bool {
        !self.is_unknown() && self.user.is_none()
    }
}

/// Whether calls depending on the current identity may be issued now.
///
/// Does not imply a user is present; check `Session::user` for that.
#[must_use]
pub fn auth_ready(session: &Session) -> bool {
    session.initialized && !session.loading
}

pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
