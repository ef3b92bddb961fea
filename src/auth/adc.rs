//! Application Default Credentials (ADC) based Bearer token provider for Google Cloud.
//!
//! Resolution order (simplified):
//! 1) Environment variable `GOOGLE_OAUTH_ACCESS_TOKEN`
//! 2) Service Account JSON via `GOOGLE_APPLICATION_CREDENTIALS`
//! 3) GCE/GKE metadata server token
//!
//! Tokens are cached in-memory and refreshed before expiration when possible.

use crate::auth::TokenCache;
use crate::auth::TokenProvider;
use crate::auth::service_account::{ServiceAccountCredentials, ServiceAccountTokenProvider};
use crate::config::DEFAULT_METADATA_TOKEN_URL;
use crate::error::GenMediaError;
use crate::secrets::{EnvSecrets, SecretsStore};
use serde::Deserialize;
use std::sync::Arc;

const METADATA_HEADER: &str = "Metadata-Flavor";
const METADATA_HEADER_VALUE: &str = "Google";
/// Env tokens carry no expiry; assume they are short-lived.
const ENV_TOKEN_LIFETIME_SECS: i64 = 600;

pub const ENV_ACCESS_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
pub const ENV_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// ADC token provider with simple caching.
pub struct AdcTokenProvider {
    http: reqwest::Client,
    metadata_url: String,
    env: Arc<dyn SecretsStore>,
    cache: TokenCache,
    // Built lazily once GOOGLE_APPLICATION_CREDENTIALS resolves
    sa_provider: tokio::sync::OnceCell<ServiceAccountTokenProvider>,
}

impl AdcTokenProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            metadata_url: DEFAULT_METADATA_TOKEN_URL.to_string(),
            env: Arc::new(EnvSecrets),
            cache: TokenCache::default(),
            sa_provider: tokio::sync::OnceCell::new(),
        }
    }

    pub fn with_metadata_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_url = url.into();
        self
    }

    /// Read the ADC environment variables from `store` instead of the process environment.
    pub fn with_env_source(mut self, store: Arc<dyn SecretsStore>) -> Self {
        self.env = store;
        self
    }

    fn env_var(&self, key: &str) -> Option<String> {
        self.env
            .get_secret(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn try_env(&self) -> Option<(String, i64)> {
        self.env_var(ENV_ACCESS_TOKEN)
            .map(|tok| (tok, ENV_TOKEN_LIFETIME_SECS))
    }

    async fn try_service_account(&self) -> Result<Option<(String, i64)>, GenMediaError> {
        let Some(path) = self.env_var(ENV_APPLICATION_CREDENTIALS) else {
            return Ok(None);
        };
        let provider = self
            .sa_provider
            .get_or_try_init(|| async {
                let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    GenMediaError::ConfigurationError(format!(
                        "Failed to read {ENV_APPLICATION_CREDENTIALS} file {path}: {e}"
                    ))
                })?;
                let creds = ServiceAccountCredentials::from_json(&content)?;
                Ok::<_, GenMediaError>(ServiceAccountTokenProvider::new(
                    creds,
                    self.http.clone(),
                    None,
                ))
            })
            .await?;
        let tok = provider.token().await?;
        // The SA provider requests one-hour tokens
        Ok(Some((tok, 3600)))
    }

    async fn try_metadata(&self) -> Result<Option<(String, i64)>, GenMediaError> {
        let resp = self
            .http
            .get(&self.metadata_url)
            .header(METADATA_HEADER, METADATA_HEADER_VALUE)
            .send()
            .await
            .map_err(|e| GenMediaError::HttpError(format!("Metadata server request failed: {e}")))?;
        if !resp.status().is_success() {
            tracing::debug!(status = %resp.status(), "metadata server declined token request");
            return Ok(None);
        }
        #[derive(Deserialize)]
        struct MdResp {
            access_token: String,
            expires_in: i64,
        }
        let m: MdResp = resp.json().await.map_err(|e| {
            GenMediaError::ParseError(format!("Failed to parse metadata token response: {e}"))
        })?;
        Ok(Some((m.access_token, m.expires_in)))
    }

    async fn resolve(&self) -> Result<(String, i64), GenMediaError> {
        if let Some(found) = self.try_env() {
            tracing::debug!("ADC token from {ENV_ACCESS_TOKEN}");
            return Ok(found);
        }
        if let Some(found) = self.try_service_account().await? {
            tracing::debug!("ADC token from {ENV_APPLICATION_CREDENTIALS}");
            return Ok(found);
        }
        match self.try_metadata().await {
            Ok(Some(found)) => {
                tracing::debug!("ADC token from metadata server");
                return Ok(found);
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "metadata server unreachable"),
        }
        Err(GenMediaError::AuthError(
            "ADC resolution failed: no env token, no service account file, no metadata token"
                .to_string(),
        ))
    }
}

#[async_trait::async_trait]
impl TokenProvider for AdcTokenProvider {
    fn cached_token(&self) -> Option<String> {
        self.cache.get()
    }

    async fn refresh(&self) -> Result<String, GenMediaError> {
        self.cache.invalidate();
        self.cache.refresh_with(|| self.resolve()).await
    }
}
