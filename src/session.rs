//! Session controller — the single writer of "who is logged in".
//!
//! ARCHITECTURE
//! ============
//! Every operation follows the same shape: take a loading guard, call the
//! provider, write the outcome into the shared `AuthStore`. Provider errors
//! never escape as faults; they are turned into a display message, stored
//! in `AuthState::error` and returned to the caller.
//!
//! `init` runs one `check_auth` and then starts a listener task on the
//! provider's change channel. Notifications overwrite the user with no merge
//! logic, so a notification that lands after an in-flight `login` wins.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::provider::{AuthChange, AuthProvider, ProviderError, User};
use crate::state::AuthStore;

pub const LOGIN_FAILED_MESSAGE: &str = "Error al iniciar sesión";
pub const LOGOUT_FAILED_MESSAGE: &str = "Error al cerrar sesión";
pub const CHECK_FAILED_MESSAGE: &str = "An unknown error occurred";

/// A failed controller operation, carrying the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SessionFailure {
    pub message: String,
}

impl SessionFailure {
    fn from_provider(err: &ProviderError, fallback: &str) -> Self {
        let message = err.user_message().unwrap_or(fallback).to_string();
        Self { message }
    }
}

#[derive(Clone)]
pub struct SessionController {
    provider: Arc<dyn AuthProvider>,
    store: AuthStore,
}

impl SessionController {
    #[must_use]
    pub fn new(provider: Arc<dyn AuthProvider>, store: AuthStore) -> Self {
        Self { provider, store }
    }

    #[must_use]
    pub fn store(&self) -> &AuthStore {
        &self.store
    }

    /// Ask the provider for the current session and mirror it locally.
    ///
    /// Returns whether a session exists. Provider failures record an error
    /// and return `false` without touching the cached user.
    pub async fn check_auth(&self) -> bool {
        let _loading = self.store.begin_loading();
        match self.provider.get_session().await {
            Ok(session) => {
                let user = session.map(|s| s.user);
                let authenticated = user.is_some();
                self.store.set_user(user);
                debug!(authenticated, "auth checked");
                authenticated
            }
            Err(e) => {
                warn!(error = %e, "auth check failed");
                let failure = SessionFailure::from_provider(&e, CHECK_FAILED_MESSAGE);
                self.store.set_error(Some(failure.message));
                false
            }
        }
    }

    /// Password sign-in. Inputs are passed through unvalidated.
    ///
    /// # Errors
    ///
    /// Returns the message stored in `AuthState::error` when the provider
    /// rejects the credentials or cannot be reached.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionFailure> {
        let _loading = self.store.begin_loading();
        self.store.set_error(None);
        match self
            .provider
            .sign_in_with_password(email, password)
            .await
        {
            Ok(session) => {
                info!(user_id = %session.user.id, "login succeeded");
                self.store.set_user(Some(session.user.clone()));
                Ok(session.user)
            }
            Err(e) => {
                warn!(error = %e, "login failed");
                let failure = SessionFailure::from_provider(&e, LOGIN_FAILED_MESSAGE);
                self.store.set_error(Some(failure.message.clone()));
                Err(failure)
            }
        }
    }

    /// Sign out at the provider, then clear the local user.
    ///
    /// # Errors
    ///
    /// Returns the stored error message when the provider refuses; the local
    /// user is left as it was in that case.
    pub async fn logout(&self) -> Result<(), SessionFailure> {
        let _loading = self.store.begin_loading();
        self.store.set_error(None);
        match self.provider.sign_out().await {
            Ok(()) => {
                info!("logout succeeded");
                self.store.set_user(None);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "logout failed");
                let failure = SessionFailure::from_provider(&e, LOGOUT_FAILED_MESSAGE);
                self.store.set_error(Some(failure.message.clone()));
                Err(failure)
            }
        }
    }

    /// Establish the initial state and start following provider notifications.
    ///
    /// The listener subscribes before the initial `check_auth` runs.
    /// Notifications sent while the check is in flight are buffered and
    /// replayed after its result, so the newest notification wins over the
    /// check even though it is applied later.
    ///
    /// The returned handle must be kept alive for as long as updates are
    /// wanted; dropping it or calling `unsubscribe` stops the listener.
    pub async fn init(&self) -> AuthSubscription {
        let mut changes = self.provider.subscribe();
        self.check_auth().await;

        let store = self.store.clone();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => apply_change(&store, change),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth change listener lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!("auth change channel closed");
                        break;
                    }
                }
            }
        });
        AuthSubscription { task: Some(task) }
    }
}

fn apply_change(store: &AuthStore, change: AuthChange) {
    debug!(event = %change.event, "auth state changed");
    store.set_user(change.user().cloned());
}

/// Handle for the notification listener started by `init`.
#[derive(Debug)]
pub struct AuthSubscription {
    task: Option<JoinHandle<()>>,
}

impl AuthSubscription {
    /// Stop receiving provider notifications.
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    /// True while the listener task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
