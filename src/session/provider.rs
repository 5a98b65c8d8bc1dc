//! Single source of truth for session state. The provider owns the session and
//! the token lifecycle; everything else observes it through `AuthContext`,
//! which can read and wait for changes but never write. Clones of a provider
//! share one instance, so redirect decisions cannot diverge.

use super::{
    auth_ready, manager::TokenManager, AuthBackend, Credentials, Error, RefreshOutcome,
    RefreshPolicy, Result, Session, TokenStorage, UserIdentity,
};
use std::sync::Arc;
use tokio::{runtime::Handle, sync::watch, task::JoinHandle};
use tracing::{debug, info, instrument, warn};

/// Owner of the session and its two imperative operations.
#[derive(Clone)]
pub struct AuthProvider {
    manager: TokenManager,
}

impl AuthProvider {
    #[must_use]
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        storage: Arc<dyn TokenStorage>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            manager: TokenManager::new(backend, storage, policy),
        }
    }

    /// Read-only subscription to the session.
    #[must_use]
    pub fn context(&self) -> AuthContext {
        AuthContext {
            rx: self.manager.inner.store.subscribe(),
        }
    }

    #[must_use]
    pub fn token_manager(&self) -> &TokenManager {
        &self.manager
    }

    /// Restores the persisted session once; see [`TokenManager::initialize`].
    pub async fn initialize(&self) {
        self.manager.initialize().await;
    }

    /// Refreshes the session token now.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.manager.refresh().await
    }

    /// Reports a request the backend rejected as unauthorized.
    pub async fn on_unauthorized(&self) -> RefreshOutcome {
        self.manager.on_unauthorized().await
    }

    /// Signs in. Any restore or refresh still in flight becomes stale.
    ///
    /// # Errors
    /// Returns the backend failure (`InvalidCredentials` for rejected
    /// credentials, transport/server errors otherwise) with the session left
    /// unauthenticated, or `Superseded` if a logout or newer login happened
    /// while waiting.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: Credentials) -> Result<UserIdentity> {
        let inner = &self.manager.inner;

        let tag = inner.store.supersede();
        self.manager.cancel();

        let result = self
            .manager
            .call_once(inner.backend.login(&credentials))
            .await;

        match result {
            Ok(grant) => {
                if !inner
                    .store
                    .apply_grant(tag, &grant, inner.storage.as_ref())
                {
                    debug!("login response superseded");
                    return Err(Error::Superseded);
                }
                self.manager.schedule(tag, &grant.token);
                info!(user_id = grant.user.id, "signed in");
                Ok(grant.user)
            }
            Err(err) => {
                if !inner
                    .store
                    .mark_unauthenticated(tag, inner.storage.as_ref())
                {
                    return Err(Error::Superseded);
                }
                warn!("Login failed: {}", err);
                Err(err)
            }
        }
    }

    /// Signs out. Memory and storage are cleared before this returns, so a
    /// refresh resolving later is discarded. Server-side revocation runs in
    /// the background when a runtime is available; its handle is returned for
    /// callers that want to wait for it.
    pub fn logout(&self) -> Option<JoinHandle<()>> {
        let inner = &self.manager.inner;

        let previous = inner.store.clear(inner.storage.as_ref());
        self.manager.cancel();

        info!("signed out");

        let token = previous?;

        match Handle::try_current() {
            Ok(handle) => {
                let backend = Arc::clone(&inner.backend);
                Some(handle.spawn(async move {
                    if let Err(err) = backend.logout(&token).await {
                        warn!("Failed to revoke session token: {}", err);
                    }
                }))
            }
            Err(_) => {
                debug!("no runtime, skipping token revocation");
                None
            }
        }
    }

    /// Teardown: stops the refresh timer without touching the session.
    pub fn shutdown(&self) {
        self.manager.cancel();
    }
}

/// Read-only view of the session for guards, hooks and pages.
#[derive(Clone, Debug)]
pub struct AuthContext {
    rx: watch::Receiver<Session>,
}

impl AuthContext {
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.rx.borrow().clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserIdentity> {
        self.rx.borrow().user.clone()
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.rx.borrow().loading
    }

    #[must_use]
    pub fn initialized(&self) -> bool {
        self.rx.borrow().initialized
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.rx.borrow().is_authenticated()
    }

    /// Safe to issue calls that depend on the current identity.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        auth_ready(&self.rx.borrow())
    }

    /// Waits for the next change. `None` once the provider is gone.
    pub async fn changed(&mut self) -> Option<Session> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Waits until [`auth_ready`] holds. `None` once the provider is gone.
    pub async fn ready(&mut self) -> Option<Session> {
        let session = self.rx.wait_for(auth_ready).await.ok()?;
        Some(session.clone())
    }

    /// Marks the current value as seen and returns it.
    pub fn current(&mut self) -> Session {
        self.rx.borrow_and_update().clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::{Grant, MemoryStorage, Role, Token};
    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretString};

    struct StaticBackend;

    #[async_trait]
    impl AuthBackend for StaticBackend {
        async fn login(&self, credentials: &Credentials) -> Result<Grant> {
            if credentials.password.expose_secret() != "correct" {
                return Err(Error::InvalidCredentials);
            }
            Ok(Grant {
                token: Token::expiring_in("access".to_string(), None, 3600),
                user: UserIdentity {
                    id: 1,
                    email: credentials.email.clone(),
                    role: Role::Editor,
                },
            })
        }

        async fn refresh(&self, _token: &Token) -> Result<Grant> {
            Err(Error::Unauthorized)
        }

        async fn validate(&self, _token: &Token) -> Result<UserIdentity> {
            Err(Error::Unauthorized)
        }

        async fn logout(&self, _token: &Token) -> Result<()> {
            Ok(())
        }
    }

    fn provider(storage: Arc<MemoryStorage>) -> AuthProvider {
        AuthProvider::new(Arc::new(StaticBackend), storage, RefreshPolicy::default())
    }

    fn credentials(password: &str) -> Credentials {
        Credentials::new("pr@prwire.test", SecretString::from(password.to_string()))
    }

    #[tokio::test]
    async fn login_publishes_user_and_persists_token() {
        let storage = Arc::new(MemoryStorage::new());
        let provider = provider(Arc::clone(&storage));
        let context = provider.context();

        let user = provider.login(credentials("correct")).await.unwrap();
        assert_eq!(user.id, 1);

        assert!(context.is_authenticated());
        assert!(context.is_ready());
        assert!(storage.peek().is_some());
        assert!(provider.token_manager().has_scheduled_refresh());

        provider.shutdown();
        assert!(!provider.token_manager().has_scheduled_refresh());
    }

    #[tokio::test]
    async fn failed_login_is_surfaced_and_leaves_known_unauthenticated() {
        let storage = Arc::new(MemoryStorage::new());
        let provider = provider(storage);

        let err = provider.login(credentials("wrong")).await.unwrap_err();
        assert!(err.is_credential());

        let session = provider.context().snapshot();
        assert!(session.is_known_unauthenticated());
        assert!(session.token.is_none());
    }

    #[tokio::test]
    async fn logout_keeps_initialized_and_clears_everything() {
        let storage = Arc::new(MemoryStorage::new());
        let provider = provider(Arc::clone(&storage));
        provider.login(credentials("correct")).await.unwrap();

        provider.logout();

        let session = provider.context().snapshot();
        assert!(session.initialized);
        assert!(!session.loading);
        assert!(session.user.is_none());
        assert!(session.token.is_none());
        assert!(storage.peek().is_none());
        assert!(!provider.token_manager().has_scheduled_refresh());
    }

    #[tokio::test]
    async fn clones_share_one_session() {
        let provider = provider(Arc::new(MemoryStorage::new()));
        let other = provider.clone();
        let context = other.context();

        provider.login(credentials("correct")).await.unwrap();
        assert!(context.is_authenticated());

        other.logout();
        assert!(!provider.context().is_authenticated());
    }

    #[test]
    fn logout_without_runtime_does_not_panic() {
        let provider = provider(Arc::new(MemoryStorage::new()));
        provider.logout();
        assert!(provider.context().initialized());
    }
}
