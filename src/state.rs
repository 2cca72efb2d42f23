//! Shared authentication state.
//!
//! DESIGN
//! ======
//! `AuthStore` is the one owned container for `AuthState`. It is handed to the
//! session controller, the route guard and any view that needs it, instead of
//! living in a global. Observers get a `watch::Receiver` and always see the
//! latest settled snapshot.
//!
//! `user` and `is_authenticated` are only ever written together through
//! `set_user`, which keeps `is_authenticated == user.is_some()`. `loading` is
//! derived from a count of in-flight operations. The count and the flag are
//! updated together inside one `send_modify`, so a finishing call can never
//! overwrite the flag a newly started call just raised.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::provider::User;

/// Snapshot of who is signed in right now.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub loading: bool,
    pub error: Option<String>,
    /// Bumped on every mutation. Observers may use it to detect missed updates.
    pub revision: u64,
}

impl AuthState {
    /// Email of the signed-in user, if any.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.email.as_deref())
    }
}

/// Cloneable handle to the shared `AuthState`.
#[derive(Clone, Debug)]
pub struct AuthStore {
    tx: Arc<watch::Sender<AuthState>>,
    /// Only touched inside `send_modify`, under the channel's write lock.
    in_flight: Arc<Mutex<usize>>,
}

impl AuthStore {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthState::default());
        Self { tx: Arc::new(tx), in_flight: Arc::new(Mutex::new(0)) }
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    /// Receiver that is notified on every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    /// Overwrite the signed-in user. Last writer wins.
    pub fn set_user(&self, user: Option<User>) {
        self.mutate(|state| {
            state.is_authenticated = user.is_some();
            state.user = user;
        });
    }

    pub fn set_error(&self, error: Option<String>) {
        self.mutate(|state| state.error = error);
    }

    /// Mark an operation as in flight until the returned guard drops.
    #[must_use = "loading is cleared as soon as the guard is dropped"]
    pub fn begin_loading(&self) -> LoadingGuard {
        self.mutate(|state| {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            *in_flight += 1;
            state.loading = true;
        });
        LoadingGuard { store: self.clone() }
    }

    fn end_loading(&self) {
        self.mutate(|state| {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            *in_flight = in_flight.saturating_sub(1);
            state.loading = *in_flight > 0;
        });
    }

    fn mutate(&self, f: impl FnOnce(&mut AuthState)) {
        self.tx.send_modify(|state| {
            f(state);
            state.revision += 1;
        });
    }
}

impl Default for AuthStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears this operation's share of `loading` when dropped, on every path.
#[derive(Debug)]
pub struct LoadingGuard {
    store: AuthStore,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.store.end_loading();
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
