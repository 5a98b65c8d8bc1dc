//! Token lifecycle: restore once, validate, and refresh before expiry.
//!
//! Flow Overview:
//! 1. `initialize` restores the persisted token exactly once, even when called
//!    concurrently.
//! 2. A valid token gets a refresh timer at 70-90% of its remaining lifetime.
//!    Rescheduling replaces the timer, it never stacks a second one.
//! 3. Only one refresh runs at a time; callers arriving meanwhile are told the
//!    refresh was coalesced.
//! 4. Transient backend failures are retried (3 attempts, 1s/2s backoff) with
//!    every call bounded by the request timeout. Anything else, or running out
//!    of attempts, signs the session out.
//!
//! Failures never reach callers of `initialize`/`refresh`; they show up only as
//! session state transitions.

use super::{
    now_unix,
    store::{RefreshStart, SessionStore},
    AuthBackend, Error, Grant, Result, Token, TokenStorage,
};
use rand::Rng;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};
use tokio::{
    sync::OnceCell,
    task::JoinHandle,
    time::{sleep, timeout, Duration},
};
use tracing::{debug, error, info, instrument, warn};

/// Retry and timing knobs for backend calls made by the lifecycle manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Attempts per refresh/validation, including the first one.
    pub attempts: u32,
    /// Upper bound for a single backend call.
    pub request_timeout: Duration,
    /// Shortest delay before a scheduled refresh.
    pub min_delay: Duration,
    /// Backoff before the second attempt, doubled for each further one.
    pub backoff: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            request_timeout: Duration::from_secs(10),
            min_delay: Duration::from_secs(1),
            backoff: Duration::from_secs(1),
        }
    }
}

impl RefreshPolicy {
    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Delay before refreshing a token with `remaining` lifetime left.
    #[must_use]
    pub fn refresh_delay(&self, remaining: Duration) -> Duration {
        let factor = rand::thread_rng().gen_range(70..90);
        let jittered = Duration::from_millis(
            u64::try_from(remaining.as_millis())
                .unwrap_or(u64::MAX)
                .saturating_mul(factor)
                / 100,
        );
        jittered.max(self.min_delay)
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Result of a refresh request, for callers that care.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new token was stored and the next refresh scheduled.
    Refreshed,
    /// Another refresh was already running; this request was dropped.
    Coalesced,
    /// There is no token to refresh.
    NoSession,
    /// The refresh failed and the session is now signed out.
    SignedOut,
    /// A login or logout owns the session; nothing was applied.
    Discarded,
}

#[derive(Default)]
struct TimerSlot {
    seq: u64,
    handle: Option<JoinHandle<()>>,
}

pub(crate) struct Inner {
    pub(crate) store: SessionStore,
    pub(crate) backend: Arc<dyn AuthBackend>,
    pub(crate) storage: Arc<dyn TokenStorage>,
    policy: RefreshPolicy,
    init: OnceCell<()>,
    refreshing: AtomicBool,
    timer: Mutex<TimerSlot>,
}

/// Keeps a valid token available without page-level involvement.
#[derive(Clone)]
pub struct TokenManager {
    pub(crate) inner: Arc<Inner>,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TokenManager {
    pub(crate) fn new(
        backend: Arc<dyn AuthBackend>,
        storage: Arc<dyn TokenStorage>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: SessionStore::new(),
                backend,
                storage,
                policy,
                init: OnceCell::new(),
                refreshing: AtomicBool::new(false),
                timer: Mutex::new(TimerSlot::default()),
            }),
        }
    }

    #[must_use]
    pub fn policy(&self) -> RefreshPolicy {
        self.inner.policy
    }

    /// Restores the persisted session once. Later and concurrent calls wait
    /// for the first one and do nothing else.
    pub async fn initialize(&self) {
        self.inner.init.get_or_init(|| self.restore()).await;
    }

    #[instrument(skip(self))]
    async fn restore(&self) {
        let Some(tag) = self.inner.store.begin_restore() else {
            debug!("session already settled, skipping restore");
            return;
        };

        let stored = match self.inner.storage.load() {
            Ok(stored) => stored,
            Err(err) => {
                warn!("Failed to read persisted token: {}", err);
                None
            }
        };

        let Some(token) = stored else {
            debug!("no persisted token");
            self.inner
                .store
                .mark_unauthenticated(tag, self.inner.storage.as_ref());
            return;
        };

        let result = if token.is_expired(now_unix()) {
            debug!("persisted token expired, refreshing");
            self.refresh_grant(&token).await
        } else {
            let backend = &self.inner.backend;
            let validated = self.call("validate", || backend.validate(&token)).await;
            match validated {
                Ok(user) => Ok(Grant { token, user }),
                Err(Error::Unauthorized) => {
                    debug!("persisted token rejected, refreshing");
                    self.refresh_grant(&token).await
                }
                Err(err) => Err(err),
            }
        };

        match self.settle(tag, result) {
            RefreshOutcome::Refreshed => info!("session restored"),
            RefreshOutcome::SignedOut => info!("persisted session is no longer valid"),
            _ => {}
        }
    }

    /// Replaces the current token with a fresh one. At most one refresh runs
    /// at a time.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> RefreshOutcome {
        if self.inner.refreshing.swap(true, Ordering::SeqCst) {
            debug!("refresh already in flight");
            return RefreshOutcome::Coalesced;
        }
        let _in_flight = InFlight(&self.inner.refreshing);

        let (tag, token) = match self.inner.store.begin_refresh() {
            RefreshStart::Started(tag, token) => (tag, token),
            RefreshStart::NoToken => {
                debug!("no session to refresh");
                return RefreshOutcome::NoSession;
            }
            RefreshStart::LoginPending => {
                debug!("login in flight, skipping refresh");
                return RefreshOutcome::Discarded;
            }
        };

        let result = self.refresh_grant(&token).await;

        self.settle(tag, result)
    }

    /// Entry point for an authenticated request the backend rejected.
    pub async fn on_unauthorized(&self) -> RefreshOutcome {
        warn!("request rejected as unauthorized, refreshing session");
        self.refresh().await
    }

    /// Aborts the pending refresh timer, if any.
    pub fn cancel(&self) {
        let mut slot = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.handle.take() {
            handle.abort();
            debug!("pending refresh cancelled");
        }
    }

    /// Whether a refresh timer is currently pending.
    #[must_use]
    pub fn has_scheduled_refresh(&self) -> bool {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle
            .is_some()
    }

    /// Number of refresh timers scheduled over the manager's lifetime.
    #[must_use]
    pub fn scheduled_refreshes(&self) -> u64 {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .seq
    }

    /// Applies a backend result if `tag` is still current.
    pub(crate) fn settle(&self, tag: u64, result: Result<Grant>) -> RefreshOutcome {
        let storage = self.inner.storage.as_ref();
        match result {
            Ok(grant) => {
                if !self.inner.store.apply_grant(tag, &grant, storage) {
                    return RefreshOutcome::Discarded;
                }
                self.schedule(tag, &grant.token);
                RefreshOutcome::Refreshed
            }
            Err(err) => {
                if !self.inner.store.mark_unauthenticated(tag, storage) {
                    return RefreshOutcome::Discarded;
                }
                error!("Session token refresh failed: {}", err);
                self.cancel();
                RefreshOutcome::SignedOut
            }
        }
    }

    /// Arms the refresh timer for `token`, replacing any previous one.
    pub(crate) fn schedule(&self, tag: u64, token: &Token) {
        let delay = self.inner.policy.refresh_delay(token.remaining(now_unix()));

        let mut slot = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // A logout that already happened must not get a timer back.
        if self.inner.store.generation() != tag {
            return;
        }

        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }

        slot.seq += 1;
        let seq = slot.seq;
        let weak = Arc::downgrade(&self.inner);

        slot.handle = Some(tokio::spawn(async move {
            sleep(delay).await;

            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = TokenManager { inner };

            if manager.detach_timer(seq) {
                manager.refresh().await;
            }
        }));

        info!(
            next_refresh_seconds = delay.as_secs(),
            "Will refresh session token in {} seconds",
            delay.as_secs()
        );
    }

    /// Takes the firing timer out of its slot so the refresh it triggers can
    /// schedule the next one without aborting itself.
    fn detach_timer(&self, seq: u64) -> bool {
        let mut slot = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.seq != seq {
            return false;
        }
        slot.handle.take();
        true
    }

    async fn refresh_grant(&self, token: &Token) -> Result<Grant> {
        let backend = &self.inner.backend;
        self.call("refresh", || backend.refresh(token)).await
    }

    /// Runs `op` once, bounded by the request timeout.
    pub(crate) async fn call_once<T, Fut>(&self, op: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let limit = self.inner.policy.request_timeout;
        match timeout(limit, op).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(limit.as_secs())),
        }
    }

    /// Runs `op` with the retry policy: transient failures back off and try
    /// again until attempts run out.
    async fn call<T, F, Fut>(&self, what: &'static str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.inner.policy.attempts.max(1);

        for attempt in 1..=attempts {
            if attempt > 1 {
                let backoff = self.inner.policy.backoff_for(attempt - 1);
                warn!("Backing off for {} seconds", backoff.as_secs());
                sleep(backoff).await;
            }

            match self.call_once(op()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(what, attempt, "Transient failure: {}", err);
                }
                Err(err) => {
                    if err.is_transient() {
                        error!("Failed to {} after {} attempts: {}", what, attempts, err);
                    }
                    return Err(err);
                }
            }
        }

        Err(Error::Timeout(self.inner.policy.request_timeout.as_secs()))
    }
}
