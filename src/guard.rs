//! Route table and navigation guard.
//!
//! SYSTEM CONTEXT
//! ==============
//! Protected views declare `requires_auth`. Before a navigation completes the
//! guard asks the provider for the user afresh (not the cached `AuthState`)
//! and redirects to the public landing route when nobody is signed in.
//! Decisions are not cached; each navigation attempt runs the lookup once.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::provider::AuthProvider;
use crate::state::{AuthState, AuthStore};

pub const LANDING_PATH: &str = "/";
pub const ADMIN_PATH: &str = "/admin";
const MAX_REDIRECTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: &'static str,
    pub name: &'static str,
    pub requires_auth: bool,
    /// Route-level redirect applied before the guard runs.
    pub redirect: Option<&'static str>,
}

/// The panel's routes: a public landing/login view and the protected admin panel.
#[must_use]
pub fn default_routes() -> Vec<Route> {
    vec![
        Route { path: LANDING_PATH, name: "Login", requires_auth: false, redirect: None },
        Route { path: ADMIN_PATH, name: "AdminPanel", requires_auth: true, redirect: None },
    ]
}

/// Outcome of one guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    Redirect(&'static str),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("no route matches {0}")]
    NotFound(String),
    #[error("redirect loop while resolving {0}")]
    RedirectLoop(String),
}

#[derive(Clone)]
pub struct RouteGuard {
    provider: Arc<dyn AuthProvider>,
}

impl RouteGuard {
    #[must_use]
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self { provider }
    }

    /// Decide whether navigation to `to` may complete.
    ///
    /// A failed user lookup counts as "no user".
    pub async fn before_each(&self, to: &Route) -> Navigation {
        if !to.requires_auth {
            return Navigation::Proceed;
        }
        let user = match self.provider.get_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, path = to.path, "user lookup failed during navigation");
                None
            }
        };
        if user.is_some() {
            Navigation::Proceed
        } else {
            debug!(path = to.path, "unauthenticated navigation redirected");
            Navigation::Redirect(LANDING_PATH)
        }
    }
}

/// Resolves paths to routes, applying route redirects and the guard.
#[derive(Clone)]
pub struct Router {
    routes: Vec<Route>,
    guard: RouteGuard,
}

impl Router {
    #[must_use]
    pub fn new(routes: Vec<Route>, guard: RouteGuard) -> Self {
        Self { routes, guard }
    }

    #[must_use]
    pub fn find(&self, path: &str) -> Option<&Route> {
        let path = normalize(path);
        self.routes.iter().find(|r| r.path == path)
    }

    /// Navigate to `path`, returning the route that ends up rendered.
    ///
    /// # Errors
    ///
    /// [`RouteError::NotFound`] for an unknown path and
    /// [`RouteError::RedirectLoop`] when redirects do not settle.
    pub async fn navigate(&self, path: &str) -> Result<&Route, RouteError> {
        let mut current = normalize(path).to_string();
        for _ in 0..MAX_REDIRECTS {
            let route = self
                .find(&current)
                .ok_or_else(|| RouteError::NotFound(current.clone()))?;
            if let Some(target) = route.redirect {
                current = target.to_string();
                continue;
            }
            match self.guard.before_each(route).await {
                Navigation::Proceed => return Ok(route),
                Navigation::Redirect(target) => current = target.to_string(),
            }
        }
        Err(RouteError::RedirectLoop(path.to_string()))
    }
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { LANDING_PATH } else { trimmed }
}

/// True once auth has settled with nobody signed in.
#[must_use]
pub fn should_redirect_unauth(state: &AuthState) -> bool {
    !state.loading && state.user.is_none()
}

/// Call `navigate(LANDING_PATH)` every time the store settles unauthenticated.
pub fn spawn_unauth_redirect<F>(store: &AuthStore, navigate: F) -> JoinHandle<()>
where
    F: Fn(&str) + Send + 'static,
{
    let mut rx = store.subscribe();
    tokio::spawn(async move {
        loop {
            let redirect = should_redirect_unauth(&rx.borrow_and_update());
            if redirect {
                navigate(LANDING_PATH);
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
