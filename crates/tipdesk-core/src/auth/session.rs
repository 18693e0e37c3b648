use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::TokenStore;
use crate::api::ApiError;
use crate::models::{AuthPayload, Credentials, Registration, UserProfile};

/// Observable authentication state.
///
/// `is_authenticated` is derived from `token` whenever the store publishes a
/// new snapshot, so the two never disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub user: Option<UserProfile>,
    pub token: Option<String>,
}

impl SessionSnapshot {
    fn build(token: Option<String>, user: Option<UserProfile>, is_loading: bool) -> Self {
        Self {
            is_authenticated: token.is_some(),
            is_loading,
            user,
            token,
        }
    }

    fn loading() -> Self {
        Self::build(None, None, true)
    }

    fn signed_out() -> Self {
        Self::build(None, None, false)
    }
}

/// Backend operations the store needs to establish a session.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthPayload, ApiError>;
    async fn register(&self, registration: &Registration) -> Result<AuthPayload, ApiError>;
    /// Resolve the profile behind the current bearer token
    async fn verify(&self) -> Result<UserProfile, ApiError>;
}

/// What the request pipeline is allowed to ask of the session.
pub trait SessionGuard: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
    /// Drop the session after the backend rejected it
    fn force_logout(&self);
}

struct Inner {
    storage: Arc<dyn TokenStore>,
    state: watch::Sender<SessionSnapshot>,
    /// Held across every storage write and the publish that follows it.
    /// The flag records whether the session has left its startup state.
    transition: Mutex<bool>,
}

/// Process-wide holder of authentication state.
/// Clone is cheap and every clone sees the same session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::loading());
        Self {
            inner: Arc::new(Inner {
                storage,
                state,
                transition: Mutex::new(false),
            }),
        }
    }

    /// Restore the session from durable storage.
    ///
    /// A persisted token is trusted as-is; call [`SessionStore::verify`] to
    /// check it against the backend. Only the first call does any work, and
    /// none at all once a login, register or logout has happened.
    pub fn initialize(&self) -> SessionSnapshot {
        let mut initialized = self.transition();
        if *initialized {
            drop(initialized);
            return self.snapshot();
        }
        *initialized = true;

        let token = match self.inner.storage.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted token, starting signed out");
                None
            }
        };
        debug!(has_token = token.is_some(), "Session initialized");

        self.publish(SessionSnapshot::build(token, None, false));
        drop(initialized);
        self.snapshot()
    }

    pub async fn login(
        &self,
        backend: &dyn AuthBackend,
        email: &str,
        password: &str,
    ) -> Result<SessionSnapshot, ApiError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let payload = backend.login(&credentials).await?;
        self.establish(payload)?;
        info!(email = email, "Login successful");
        Ok(self.snapshot())
    }

    pub async fn register(
        &self,
        backend: &dyn AuthBackend,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<SessionSnapshot, ApiError> {
        let registration = Registration {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        };
        let payload = backend.register(&registration).await?;
        self.establish(payload)?;
        info!(email = email, "Registration successful");
        Ok(self.snapshot())
    }

    /// Forget the session locally. The backend is not contacted.
    pub fn logout(&self) {
        self.clear("logout");
    }

    /// Check the current token with the backend and load the user profile.
    ///
    /// A rejected token clears the session even when the pipeline skipped
    /// its own teardown (for example while on the login screen).
    pub async fn verify(&self, backend: &dyn AuthBackend) -> Result<SessionSnapshot, ApiError> {
        if self.bearer_token().is_none() {
            return Err(ApiError::Unauthorized);
        }
        match backend.verify().await {
            Ok(user) => {
                self.inner.state.send_modify(|state| {
                    if state.token.is_some() {
                        state.user = Some(user);
                    }
                });
                Ok(self.snapshot())
            }
            Err(ApiError::Unauthorized) => {
                self.clear("verify rejected");
                Err(ApiError::Unauthorized)
            }
            Err(e) => Err(e),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.inner.state.borrow().user.clone()
    }

    /// Watch for session changes (login, logout, forced logout).
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    fn establish(&self, payload: AuthPayload) -> Result<(), ApiError> {
        let mut initialized = self.transition();
        self.inner
            .storage
            .save(&payload.token)
            .map_err(ApiError::Storage)?;
        *initialized = true;
        self.publish(SessionSnapshot::build(
            Some(payload.token),
            Some(payload.user),
            false,
        ));
        Ok(())
    }

    fn clear(&self, reason: &str) {
        let mut initialized = self.transition();
        if let Err(e) = self.inner.storage.remove() {
            warn!(error = %e, reason = reason, "Failed to remove persisted token");
        }
        *initialized = true;
        self.publish(SessionSnapshot::signed_out());
        drop(initialized);
        info!(reason = reason, "Session cleared");
    }

    fn transition(&self) -> MutexGuard<'_, bool> {
        self.inner.transition.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, snapshot: SessionSnapshot) {
        self.inner.state.send_replace(snapshot);
    }
}

impl SessionGuard for SessionStore {
    /// Restores a persisted session first if nothing has initialized it yet.
    fn bearer_token(&self) -> Option<String> {
        let initialized = *self.transition();
        if !initialized {
            self.initialize();
        }
        self.inner.state.borrow().token.clone()
    }

    fn force_logout(&self) {
        self.clear("forced logout");
    }
}
