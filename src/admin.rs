//! Privileged bootstrap sign-in with the configured admin credentials.

use tracing::{error, info};

use crate::config::{ConfigError, ProviderConfig};
use crate::provider::{AuthProvider, ProviderError, Session};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Sign in as the configured admin.
///
/// # Errors
///
/// [`ConfigError::AdminCredentialsMissing`] before any network call when
/// either credential is unset; otherwise the provider's rejection.
pub async fn sign_in_as_admin(provider: &dyn AuthProvider, config: &ProviderConfig) -> Result<Session, AdminError> {
    let creds = config.admin_credentials()?;
    match provider
        .sign_in_with_password(&creds.email, &creds.password)
        .await
    {
        Ok(session) => {
            info!(email = %creds.email, "signed in as admin");
            Ok(session)
        }
        Err(e) => {
            error!(error = %e, "error signing in as admin");
            Err(e.into())
        }
    }
}

#[cfg(test)]
#[path = "admin_test.rs"]
mod tests;
