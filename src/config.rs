//! Provider configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Values are read once at process start. The endpoint and anon key are
//! required; admin credentials are optional and only checked when the admin
//! bootstrap path runs, so a missing admin password never blocks normal use.

use std::path::PathBuf;

pub const DEFAULT_STORAGE_BUCKET: &str = "product-images";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Session file location relative to `$HOME` when `SUPABASE_SESSION_FILE` is unset.
pub const DEFAULT_SESSION_FILE: &str = ".catalog-admin/session.json";

/// Errors raised while reading configuration. Always surfaced before any
/// network call is attempted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    #[error("missing required config: env var {var} not set")]
    MissingVar { var: String },

    /// An environment variable is set but cannot be parsed.
    #[error("invalid value for {var}: {value}")]
    InvalidVar { var: String, value: String },

    /// `ADMIN_EMAIL` or `ADMIN_PASSWORD` is unset.
    #[error("Admin credentials not configured")]
    AdminCredentialsMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

/// Admin login pair used by the bootstrap sign-in helper.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Project endpoint without a trailing slash, e.g. `https://abc.supabase.co`.
    pub url: String,
    pub anon_key: String,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub storage_bucket: String,
    /// Where the signed-in session is persisted between runs. `None` keeps it in memory only.
    /// `from_env` defaults this to `$HOME/.catalog-admin/session.json`.
    pub session_file: Option<PathBuf>,
    pub auto_refresh: bool,
    pub timeouts: HttpTimeouts,
}

impl ProviderConfig {
    /// Build typed provider config from environment variables.
    ///
    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `ADMIN_EMAIL`, `ADMIN_PASSWORD`
    /// - `STORAGE_BUCKET`: default `product-images`
    /// - `SUPABASE_SESSION_FILE`: path for session persistence, default
    ///   `$HOME/.catalog-admin/session.json`
    /// - `SUPABASE_AUTO_REFRESH`: default true
    /// - `SUPABASE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `SUPABASE_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] for an absent required value and
    /// [`ConfigError::InvalidVar`] for an unparsable boolean.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = required("SUPABASE_URL")?.trim_end_matches('/').to_string();
        let anon_key = required("SUPABASE_ANON_KEY")?;

        let auto_refresh = match optional("SUPABASE_AUTO_REFRESH") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidVar { var: "SUPABASE_AUTO_REFRESH".into(), value: raw })?,
            None => true,
        };

        Ok(Self {
            url,
            anon_key,
            admin_email: optional("ADMIN_EMAIL"),
            admin_password: secret("ADMIN_PASSWORD"),
            storage_bucket: optional("STORAGE_BUCKET").unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string()),
            session_file: optional("SUPABASE_SESSION_FILE")
                .map(PathBuf::from)
                .or_else(default_session_file),
            auto_refresh,
            timeouts: HttpTimeouts {
                request_secs: env_parse_u64("SUPABASE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
                connect_secs: env_parse_u64("SUPABASE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
            },
        })
    }

    /// Config pointing at `url` with defaults for everything optional.
    #[must_use]
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            admin_email: None,
            admin_password: None,
            storage_bucket: DEFAULT_STORAGE_BUCKET.to_string(),
            session_file: None,
            auto_refresh: true,
            timeouts: HttpTimeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
        }
    }

    /// Both admin credentials, or [`ConfigError::AdminCredentialsMissing`].
    ///
    /// # Errors
    ///
    /// Fails when either `admin_email` or `admin_password` is unset.
    pub fn admin_credentials(&self) -> Result<AdminCredentials, ConfigError> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Ok(AdminCredentials { email: email.clone(), password: password.clone() }),
            _ => Err(ConfigError::AdminCredentialsMissing),
        }
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    optional(key).ok_or_else(|| ConfigError::MissingVar { var: key.to_string() })
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Like `optional` but keeps surrounding whitespace, which is significant in passwords.
fn secret(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn default_session_file() -> Option<PathBuf> {
    optional("HOME").map(|home| PathBuf::from(home).join(DEFAULT_SESSION_FILE))
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
