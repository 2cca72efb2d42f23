//! Supabase HTTP client — auth (GoTrue), storage and REST plumbing.
//!
//! ARCHITECTURE
//! ============
//! One `reqwest::Client` carries the `apikey` and `X-Client-Info` headers on
//! every request. The signed-in session lives in a `RwLock` cache; every
//! change to it goes through `set_session`, which persists it (when a session
//! file is configured, creating its directory on first write) and broadcasts an `AuthChange` to subscribers.
//!
//! TRADE-OFFS
//! ==========
//! Sign-out only clears the cache when the provider confirms it or reports
//! the token as already invalid. A transport failure leaves the session in
//! place so local state never claims a logout the provider did not see.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::types::{AuthChange, AuthEvent, ProviderError, Session, User};
use super::{AuthProvider, ObjectStorage};
use crate::config::ProviderConfig;

/// Sessions expiring within this many seconds are refreshed before use.
pub const EXPIRY_MARGIN_SECS: i64 = 30;
pub const AUTO_REFRESH_TICK_SECS: u64 = 30;
/// The auto-refresh task refreshes sessions that expire within this many ticks.
pub const AUTO_REFRESH_TICK_THRESHOLD: u64 = 3;
const CHANGE_CHANNEL_CAPACITY: usize = 32;

pub struct SupabaseClient {
    http: reqwest::Client,
    config: ProviderConfig,
    session: RwLock<Option<Session>>,
    changes: broadcast::Sender<AuthChange>,
}

impl SupabaseClient {
    /// Build a client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::HttpClientBuild`] if the anon key is not a
    /// valid header value or the HTTP client cannot be constructed.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = build_http_client(&config)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self { http, config, session: RwLock::new(None), changes })
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Load a previously persisted session, if a session file is configured
    /// and present. Broadcasts `INITIAL_SESSION` either way.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Io`] when the file exists but cannot be read,
    /// and [`ProviderError::Parse`] when its contents are not a session.
    pub async fn restore_session(&self) -> Result<Option<Session>, ProviderError> {
        let restored = match &self.config.session_file {
            Some(path) => read_session_file(path).await?,
            None => None,
        };
        if let Some(session) = &restored {
            debug!(user_id = %session.user.id, "restored persisted session");
        }
        *self.session.write().await = restored.clone();
        let _ = self
            .changes
            .send(AuthChange::new(AuthEvent::InitialSession, restored.clone()));
        Ok(restored)
    }

    /// Exchange the cached refresh token for a new session.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotAuthenticated`] without a cached session. A
    /// rejected refresh token clears the session and broadcasts `SIGNED_OUT`
    /// before the rejection is returned.
    pub async fn refresh_session(&self) -> Result<Session, ProviderError> {
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(ProviderError::NotAuthenticated)?;

        let request = self
            .http
            .post(self.auth_url("/token?grant_type=refresh_token"))
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        match self.execute(request).await.and_then(|body| parse_session(&body)) {
            Ok(session) => {
                debug!(user_id = %session.user.id, "session refreshed");
                self.set_session(Some(session.clone()), AuthEvent::TokenRefreshed)
                    .await;
                Ok(session)
            }
            Err(e @ ProviderError::Rejected { .. }) => {
                warn!(error = %e, "refresh token rejected; clearing session");
                self.set_session(None, AuthEvent::SignedOut).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Spawn the background refresher. Returns `None` when auto-refresh is disabled.
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.config.auto_refresh {
            return None;
        }
        let client = Arc::clone(self);
        info!(tick_secs = AUTO_REFRESH_TICK_SECS, "session auto-refresh started");
        Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(AUTO_REFRESH_TICK_SECS));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                client.refresh_if_expiring().await;
            }
        }))
    }

    async fn refresh_if_expiring(&self) {
        let horizon = i64::try_from(AUTO_REFRESH_TICK_SECS * AUTO_REFRESH_TICK_THRESHOLD).unwrap_or(i64::MAX);
        let expiring = self
            .session
            .read()
            .await
            .as_ref()
            .is_some_and(|s| s.expires_within(now_unix(), horizon));
        if expiring {
            if let Err(e) = self.refresh_session().await {
                warn!(error = %e, "auto-refresh failed");
            }
        }
    }

    /// Bearer token for REST and storage calls: the session's access token
    /// when signed in, otherwise the anon key. A session close to expiry is
    /// refreshed first.
    pub(crate) async fn bearer_token(&self) -> Result<String, ProviderError> {
        Ok(self
            .get_session()
            .await?
            .map_or_else(|| self.config.anon_key.clone(), |s| s.access_token))
    }

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.config.url)
    }

    pub(crate) fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http.request(method, url)
    }

    /// Send a request and return its body, mapping non-2xx statuses to errors.
    pub(crate) async fn execute(&self, request: reqwest::RequestBuilder) -> Result<String, ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(error_from_response(status, &body));
        }
        Ok(body)
    }

    async fn set_session(&self, session: Option<Session>, event: AuthEvent) {
        *self.session.write().await = session.clone();
        if let Some(path) = &self.config.session_file {
            if let Err(e) = write_session_file(path, session.as_ref()).await {
                warn!(error = %e, path = %path.display(), "failed to persist session");
            }
        }
        debug!(%event, "auth state change");
        let _ = self.changes.send(AuthChange::new(event, session));
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{path}", self.config.url)
    }
}

#[async_trait::async_trait]
impl AuthProvider for SupabaseClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        let request = self
            .http
            .post(self.auth_url("/token?grant_type=password"))
            .json(&serde_json::json!({ "email": email, "password": password }));
        let body = self.execute(request).await?;
        let session = parse_session(&body)?;
        info!(user_id = %session.user.id, "signed in with password");
        self.set_session(Some(session.clone()), AuthEvent::SignedIn)
            .await;
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let access_token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone());
        let Some(access_token) = access_token else {
            debug!("sign-out without a session");
            return Ok(());
        };

        let request = self
            .http
            .post(self.auth_url("/logout?scope=global"))
            .bearer_auth(access_token);
        match self.execute(request).await {
            Ok(_) => {}
            Err(e) if e.is_session_gone() => debug!(error = %e, "session already invalid at provider"),
            Err(e) => return Err(e),
        }
        info!("signed out");
        self.set_session(None, AuthEvent::SignedOut).await;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        let current = self.session.read().await.clone();
        let Some(session) = current else {
            return Ok(None);
        };
        if !session.expires_within(now_unix(), EXPIRY_MARGIN_SECS) {
            return Ok(Some(session));
        }
        self.refresh_session().await.map(Some)
    }

    async fn get_user(&self) -> Result<Option<User>, ProviderError> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };
        let request = self
            .http
            .get(self.auth_url("/user"))
            .bearer_auth(&session.access_token);
        let body = self.execute(request).await?;
        serde_json::from_str::<User>(&body)
            .map(Some)
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }
}

#[async_trait::async_trait]
impl ObjectStorage for SupabaseClient {
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, ProviderError> {
        let token = self.bearer_token().await?;
        let request = self
            .http
            .post(object_url(&self.config.url, bucket, path))
            .bearer_auth(token)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.execute(request).await?;
        debug!(bucket, path, "object uploaded");
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        public_object_url(&self.config.url, bucket, path)
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), ProviderError> {
        let token = self.bearer_token().await?;
        let request = self
            .http
            .delete(format!("{}/storage/v1/object/{bucket}", self.config.url))
            .bearer_auth(token)
            .json(&serde_json::json!({ "prefixes": paths }));
        self.execute(request).await?;
        debug!(bucket, count = paths.len(), "objects removed");
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn build_http_client(config: &ProviderConfig) -> Result<reqwest::Client, ProviderError> {
    let mut headers = HeaderMap::new();
    let api_key =
        HeaderValue::from_str(&config.anon_key).map_err(|e| ProviderError::HttpClientBuild(e.to_string()))?;
    headers.insert(HeaderName::from_static("apikey"), api_key);
    headers.insert(
        HeaderName::from_static("x-client-info"),
        HeaderValue::from_static(concat!("catalog-admin/", env!("CARGO_PKG_VERSION"))),
    );
    let bearer = HeaderValue::from_str(&format!("Bearer {}", config.anon_key))
        .map_err(|e| ProviderError::HttpClientBuild(e.to_string()))?;
    headers.insert(AUTHORIZATION, bearer);

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeouts.request_secs))
        .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
        .build()
        .map_err(|e| ProviderError::HttpClientBuild(e.to_string()))
}

pub(crate) fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

pub(crate) fn object_url(base: &str, bucket: &str, path: &str) -> String {
    format!("{base}/storage/v1/object/{bucket}/{}", path.trim_start_matches('/'))
}

pub(crate) fn public_object_url(base: &str, bucket: &str, path: &str) -> String {
    format!("{base}/storage/v1/object/public/{bucket}/{}", path.trim_start_matches('/'))
}

fn parse_session(body: &str) -> Result<Session, ProviderError> {
    let session: Session = serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(session.with_expiry_from(now_unix()))
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<Value>,
}

/// Map a non-2xx response to a `ProviderError`.
///
/// The auth, storage and REST services each shape their error bodies
/// differently; the first human-readable field found wins. Client errors
/// become `Rejected`, anything else `Response`.
pub(crate) fn error_from_response(status: u16, body: &str) -> ProviderError {
    if !(400..500).contains(&status) {
        return ProviderError::Response { status, body: body.to_string() };
    }
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .or_else(|| parsed.error.and_then(|v| v.as_str().map(str::to_string)))
        .unwrap_or_default();
    ProviderError::Rejected { status, message }
}

async fn read_session_file(path: &Path) -> Result<Option<Session>, ProviderError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ProviderError::Io(e.to_string())),
    };
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|e| ProviderError::Parse(e.to_string()))
}

async fn write_session_file(path: &Path, session: Option<&Session>) -> Result<(), ProviderError> {
    match session {
        Some(session) => {
            let raw = serde_json::to_vec_pretty(session).map_err(|e| ProviderError::Parse(e.to_string()))?;
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| ProviderError::Io(e.to_string()))?;
            }
            tokio::fs::write(path, raw)
                .await
                .map_err(|e| ProviderError::Io(e.to_string()))
        }
        None => match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProviderError::Io(e.to_string())),
        },
    }
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
