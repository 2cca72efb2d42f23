//! Provider types — sessions, users, change notifications and errors.
//!
//! These mirror the identity provider's JSON payloads closely enough to
//! deserialize them directly, while staying independent of any one transport.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by identity or storage provider calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider refused the request (bad credentials, expired token, RLS).
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The request never produced a response (DNS, TLS, timeout, reset).
    #[error("request failed: {0}")]
    Request(String),

    /// The provider answered with an unexpected non-success status.
    #[error("unexpected response: status {status}")]
    Response { status: u16, body: String },

    /// The response body could not be deserialized.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The call needs a signed-in session and none is cached.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Reading or writing the persisted session failed.
    #[error("session file error: {0}")]
    Io(String),
}

impl ProviderError {
    /// Message suitable for showing to the operator, or `None` when the
    /// error carries nothing better than a generic fallback.
    #[must_use]
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } if !message.trim().is_empty() => Some(message.as_str()),
            _ => None,
        }
    }

    /// True when the provider reports the token or session as no longer valid.
    #[must_use]
    pub fn is_session_gone(&self) -> bool {
        matches!(self, Self::Rejected { status: 401 | 403 | 404, .. } | Self::NotAuthenticated)
    }
}

// =============================================================================
// USER / SESSION
// =============================================================================

/// Identity record as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Provider-issued token set. The client only ever holds a cached copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
    /// Unix seconds. Filled from `expires_in` when the provider omits it.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub refresh_token: String,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Fill `expires_at` relative to `now` when the provider omitted it.
    #[must_use]
    pub fn with_expiry_from(mut self, now: i64) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Some(now.saturating_add(self.expires_in));
        }
        self
    }

    /// True if the session expires within `margin_secs` of `now`.
    /// A session without a known expiry is treated as still valid.
    #[must_use]
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|at| at.saturating_sub(now) <= margin_secs)
    }
}

// =============================================================================
// CHANGE NOTIFICATIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

impl AuthEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitialSession => "INITIAL_SESSION",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
        }
    }
}

impl std::fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One session-change notification pushed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

impl AuthChange {
    #[must_use]
    pub fn new(event: AuthEvent, session: Option<Session>) -> Self {
        Self { event, session }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { event: AuthEvent::SignedOut, session: None }
    }

    /// User carried by the notification, if any.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
