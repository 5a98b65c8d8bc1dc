//! Per-page gating. A guard turns session updates into one of three render
//! decisions and performs redirects through an injected [`Navigator`]. It never
//! shows protected content, and never navigates, while the session is still
//! unknown.

use crate::session::{AuthContext, Session};
use std::sync::Mutex;
use tracing::{debug, info};

pub const LOGIN_PATH: &str = "/login";
pub const LANDING_PATH: &str = "/dashboard";

/// Capability to move the user elsewhere.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Where each redirect goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirects {
    pub login_path: String,
    pub landing_path: String,
}

impl Default for Redirects {
    fn default() -> Self {
        Self {
            login_path: LOGIN_PATH.to_string(),
            landing_path: LANDING_PATH.to_string(),
        }
    }
}

/// Which sessions a page accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardPolicy {
    /// Protected pages: signed-in users only.
    RequireAuth,
    /// Login/signup style pages: signed-out users only.
    PublicOnly,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardState {
    /// Session is loading.
    Unknown,
    /// Navigation issued; the guard is done.
    Redirecting(String),
    RenderContent,
    /// Not loading but not initialized either.
    RenderFallback,
}

/// What the page should show for the current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Render {
    Placeholder,
    Content,
    Nothing,
}

pub struct RouteGuard<N: Navigator> {
    policy: GuardPolicy,
    redirects: Redirects,
    navigator: N,
    state: GuardState,
}

impl<N: Navigator> RouteGuard<N> {
    #[must_use]
    pub fn new(policy: GuardPolicy, redirects: Redirects, navigator: N) -> Self {
        Self {
            policy,
            redirects,
            navigator,
            state: GuardState::Unknown,
        }
    }

    #[must_use]
    pub fn state(&self) -> &GuardState {
        &self.state
    }

    #[must_use]
    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Feeds a session update through the state machine.
    pub fn observe(&mut self, session: &Session) -> Render {
        if matches!(self.state, GuardState::Redirecting(_)) {
            return Render::Nothing;
        }

        let next = if session.loading {
            GuardState::Unknown
        } else if !session.initialized {
            GuardState::RenderFallback
        } else {
            match (self.policy, session.user.is_some()) {
                (GuardPolicy::RequireAuth, false) => {
                    GuardState::Redirecting(self.redirects.login_path.clone())
                }
                (GuardPolicy::PublicOnly, true) => {
                    GuardState::Redirecting(self.redirects.landing_path.clone())
                }
                _ => GuardState::RenderContent,
            }
        };

        if next != self.state {
            debug!(policy = ?self.policy, from = ?self.state, to = ?next, "guard transition");
        }

        if let GuardState::Redirecting(path) = &next {
            info!(policy = ?self.policy, path = %path, "redirecting");
            self.navigator.navigate(path);
        }

        self.state = next;
        self.render()
    }

    #[must_use]
    pub fn render(&self) -> Render {
        match self.state {
            GuardState::Unknown | GuardState::RenderFallback => Render::Placeholder,
            GuardState::RenderContent => Render::Content,
            GuardState::Redirecting(_) => Render::Nothing,
        }
    }

    /// Drives the guard from `context` until it redirects or the provider goes
    /// away, reporting every render decision. Returns the final state.
    pub async fn run<F>(&mut self, context: &mut AuthContext, mut on_render: F) -> GuardState
    where
        F: FnMut(Render),
    {
        let mut session = context.current();

        loop {
            on_render(self.observe(&session));

            if matches!(self.state, GuardState::Redirecting(_)) {
                break;
            }

            match context.changed().await {
                Some(next) => session = next,
                None => break,
            }
        }

        self.state.clone()
    }
}

/// Navigator that records every destination, for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn visits(&self) -> Vec<String> {
        self.visits
            .lock()
            .map(|visits| visits.clone())
            .unwrap_or_default()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        if let Ok(mut visits) = self.visits.lock() {
            visits.push(path.to_string());
        }
    }
}

impl<N: Navigator> Navigator for std::sync::Arc<N> {
    fn navigate(&self, path: &str) {
        (**self).navigate(path);
    }
}
