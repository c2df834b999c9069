//! Bearer credentials for the BigQuery REST API.
//!
//! A service account key mints short-lived access tokens and refreshes them
//! before they expire, so long copies keep authenticating. A static access
//! token is used as-is.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::ServiceAccountAuthenticator;

use crate::config::DestinationConfig;
use crate::error::{Error, Result};

/// OAuth2 scope granting BigQuery read and write access.
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Supplies the bearer token for each request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current access token. Called once per request.
    async fn access_token(&self) -> Result<String>;
}

/// A token obtained elsewhere, e.g. `gcloud auth print-access-token`.
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps a ready-made access token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Tokens minted from a service account key file.
///
/// The key is read on first use; the authenticator caches the token and
/// requests a new one when it is close to expiry.
pub struct ServiceAccountToken {
    key_file: PathBuf,
    authenticator: OnceCell<DefaultAuthenticator>,
}

impl ServiceAccountToken {
    /// Creates a token source for the key at `key_file`.
    #[must_use]
    pub fn new(key_file: impl AsRef<Path>) -> Self {
        Self {
            key_file: key_file.as_ref().to_path_buf(),
            authenticator: OnceCell::new(),
        }
    }

    async fn authenticator(&self) -> Result<&DefaultAuthenticator> {
        self.authenticator
            .get_or_try_init(|| async {
                let key = yup_oauth2::read_service_account_key(&self.key_file)
                    .await
                    .map_err(|e| {
                        Error::Authentication(format!(
                            "cannot read service account key {}: {}",
                            self.key_file.display(),
                            e
                        ))
                    })?;
                info!("Authenticating to BigQuery as {}", key.client_email);
                ServiceAccountAuthenticator::builder(key)
                    .build()
                    .await
                    .map_err(|e| {
                        Error::Authentication(format!("cannot build authenticator: {}", e))
                    })
            })
            .await
    }
}

#[async_trait]
impl TokenSource for ServiceAccountToken {
    async fn access_token(&self) -> Result<String> {
        let token = self
            .authenticator()
            .await?
            .token(&[BIGQUERY_SCOPE])
            .await
            .map_err(|e| Error::Authentication(format!("token request failed: {}", e)))?;
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| Error::Authentication("token response had no access token".to_string()))
    }
}

/// Picks the credential for a destination: the key file wins over a static token.
#[must_use]
pub fn token_source(config: &DestinationConfig) -> Option<Arc<dyn TokenSource>> {
    if let Some(key_file) = &config.key_file {
        return Some(Arc::new(ServiceAccountToken::new(key_file)));
    }
    config
        .access_token
        .as_deref()
        .filter(|token| !token.is_empty())
        .map(|token| Arc::new(StaticToken::new(token)) as Arc<dyn TokenSource>)
}
