//! # prgate (session gating for the PR distribution dashboard)
//!
//! `prgate` decides when the dashboard may render protected views and keeps
//! the session token valid while it runs. The dashboard itself (report
//! uploads, blocked URLs, websites, user accounts) is a thin client over the
//! backend API; this crate owns the one stateful piece underneath it.
//!
//! ## Session
//!
//! A single [`session::AuthProvider`] owns the [`session::Session`]. Consumers
//! subscribe through [`session::AuthContext`], a read-only view that cannot
//! mutate the shared state. The provider exposes exactly two imperative
//! operations, `login` and `logout`.
//!
//! - **Unknown vs unauthenticated:** while `loading` is set or the session is
//!   not yet `initialized`, a missing user means "not known yet", never
//!   "signed out".
//! - **Staleness:** every async operation records the session generation when
//!   it starts. `login` and `logout` bump the generation, so late responses are
//!   dropped instead of resurrecting a cleared session.
//!
//! ## Token lifecycle
//!
//! [`session::TokenManager`] restores a persisted token once, validates it and
//! schedules a refresh at 70-90% of the remaining lifetime. Transient failures
//! are retried with exponential backoff; anything else signs the session out.
//!
//! ## Route guards
//!
//! [`guard::RouteGuard`] turns session updates into render/redirect decisions
//! through an injected [`guard::Navigator`], so it can be driven without a
//! browser.

pub mod cli;
pub mod guard;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with("prgate/"));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
