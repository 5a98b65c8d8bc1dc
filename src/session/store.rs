//! Owned session state. Every mutation goes through a closure on the watch
//! sender, so the generation check, the in-memory update and the matching
//! storage write happen under one lock. A result tagged with an older
//! generation is refused, and nothing new starts while a login is pending.

use super::{auth_ready, Grant, Session, Token, TokenStorage};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, warn};

/// How a refresh request met the session.
pub(crate) enum RefreshStart {
    Started(u64, Token),
    NoToken,
    LoginPending,
}

pub(crate) struct SessionStore {
    tx: watch::Sender<Session>,
    // Only written inside `tx` closures.
    generation: AtomicU64,
    // Tag of the login awaiting its response, 0 when none.
    pending_login: AtomicU64,
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::default());
        Self {
            tx,
            generation: AtomicU64::new(0),
            pending_login: AtomicU64::new(0),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    pub(crate) fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn current(&self, tag: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == tag
    }

    fn login_pending(&self) -> bool {
        self.pending_login.load(Ordering::SeqCst) != 0
    }

    /// Marks the start of a restore under `tag`. Returns the tag to carry, or
    /// `None` when a login or logout already owns the session.
    pub(crate) fn begin_restore(&self) -> Option<u64> {
        let mut tag = None;
        self.tx.send_if_modified(|session| {
            if session.initialized || self.login_pending() {
                return false;
            }
            tag = Some(self.generation.load(Ordering::SeqCst));
            let changed = !session.loading;
            session.loading = true;
            changed
        });
        tag
    }

    /// Captures the current token and generation for a refresh. Refused while
    /// a login is pending.
    pub(crate) fn begin_refresh(&self) -> RefreshStart {
        let mut started = RefreshStart::NoToken;
        self.tx.send_if_modified(|session| {
            if self.login_pending() {
                started = RefreshStart::LoginPending;
                return false;
            }
            let Some(token) = session.token.clone() else {
                return false;
            };
            started = RefreshStart::Started(self.generation.load(Ordering::SeqCst), token);
            let changed = !session.loading;
            session.loading = true;
            changed
        });
        started
    }

    /// Starts a login that invalidates everything in flight. Restores and
    /// refreshes are refused until it settles.
    pub(crate) fn supersede(&self) -> u64 {
        let mut tag = 0;
        self.tx.send_modify(|session| {
            tag = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.pending_login.store(tag, Ordering::SeqCst);
            session.loading = true;
        });
        tag
    }

    /// Publishes a fresh grant if `tag` is still current.
    pub(crate) fn apply_grant(&self, tag: u64, grant: &Grant, storage: &dyn TokenStorage) -> bool {
        self.tx.send_if_modified(|session| {
            if !self.current(tag) {
                debug!(tag, "discarding stale grant");
                return false;
            }
            self.pending_login.store(0, Ordering::SeqCst);
            if let Err(err) = storage.save(&grant.token) {
                warn!("Failed to persist session token: {}", err);
            }
            session.token = Some(grant.token.clone());
            session.user = Some(grant.user.clone());
            session.initialized = true;
            session.loading = false;
            true
        })
    }

    /// Settles the session as known-unauthenticated if `tag` is still current.
    pub(crate) fn mark_unauthenticated(&self, tag: u64, storage: &dyn TokenStorage) -> bool {
        self.tx.send_if_modified(|session| {
            if !self.current(tag) {
                debug!(tag, "discarding stale failure");
                return false;
            }
            self.pending_login.store(0, Ordering::SeqCst);
            if let Err(err) = storage.clear() {
                warn!("Failed to clear session token: {}", err);
            }
            session.token = None;
            session.user = None;
            session.initialized = true;
            session.loading = false;
            true
        })
    }

    /// Logout: invalidates in-flight work and clears memory and storage.
    /// `initialized` stays set so consumers do not fall back to "unknown".
    pub(crate) fn clear(&self, storage: &dyn TokenStorage) -> Option<Token> {
        let mut previous = None;
        self.tx.send_modify(|session| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.pending_login.store(0, Ordering::SeqCst);
            if let Err(err) = storage.clear() {
                warn!("Failed to clear session token: {}", err);
            }
            previous = session.token.take();
            session.user = None;
            session.initialized = true;
            session.loading = false;
        });
        previous
    }

    pub(crate) fn is_ready(&self) -> bool {
        auth_ready(&self.tx.borrow())
    }
}
