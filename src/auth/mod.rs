//! Authentication helpers and token providers.
//!
//! `TokenProvider` supplies Bearer tokens for Vertex AI and Cloud Storage. Concrete
//! providers cover service-account keys, workload identity federation and Application
//! Default Credentials; `resolver` picks one from the configured secrets.

use crate::error::GenMediaError;
use std::sync::Mutex;

pub mod adc;
pub mod external_account;
pub mod resolver;
pub mod service_account;

pub use adc::AdcTokenProvider;
pub use external_account::{ExternalAccountConfig, ExternalAccountTokenProvider};
pub use resolver::{
    Credential, CredentialResolver, CredentialSource, ResolvedCredentials, get_access_token,
};
pub use service_account::{ServiceAccountCredentials, ServiceAccountTokenProvider};

/// OAuth scope requested for every Google Cloud token.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Refresh this many seconds before the reported expiry.
pub(crate) const EXPIRY_SAFETY_WINDOW: i64 = 300;

/// An async Bearer token provider.
///
/// Implementations cache the token they fetched and report whether it is still usable;
/// `token()` refreshes only when it is not.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// Currently cached token, if it is still inside its validity window.
    fn cached_token(&self) -> Option<String>;

    /// Fetch a fresh token from the issuer, replacing the cached one.
    async fn refresh(&self) -> Result<String, GenMediaError>;

    /// Whether the cached token can be used without refreshing.
    fn is_valid(&self) -> bool {
        self.cached_token().is_some()
    }

    /// Returns an access token suitable for the `Authorization: Bearer <token>` header.
    async fn token(&self) -> Result<String, GenMediaError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }
        self.refresh().await
    }
}

/// A static token provider for tests and externally managed tokens.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticTokenProvider {
    fn cached_token(&self) -> Option<String> {
        Some(self.token.clone())
    }

    async fn refresh(&self) -> Result<String, GenMediaError> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    exp_unix: i64,
}

/// In-memory token cache with single-flight refresh.
///
/// The value lock is held only for reads and writes; the async refresh lock serialises
/// concurrent refreshes so only one request hits the issuer.
#[derive(Debug, Default)]
pub(crate) struct TokenCache {
    value: Mutex<Option<CachedToken>>,
    refreshing: tokio::sync::Mutex<()>,
}

impl TokenCache {
    pub(crate) fn get(&self) -> Option<String> {
        let now = chrono::Utc::now().timestamp();
        if let Ok(guard) = self.value.lock()
            && let Some(ct) = guard.as_ref()
            && ct.exp_unix - EXPIRY_SAFETY_WINDOW > now
        {
            return Some(ct.token.clone());
        }
        None
    }

    pub(crate) fn set(&self, token: String, expires_in: i64) {
        let exp_unix = chrono::Utc::now().timestamp() + expires_in;
        if let Ok(mut guard) = self.value.lock() {
            *guard = Some(CachedToken { token, exp_unix });
        }
    }

    /// Run `fetch` unless another caller refreshed while we waited for the lock.
    pub(crate) async fn refresh_with<F, Fut>(&self, fetch: F) -> Result<String, GenMediaError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(String, i64), GenMediaError>>,
    {
        let _guard = self.refreshing.lock().await;
        if let Some(token) = self.get() {
            return Ok(token);
        }
        let (token, expires_in) = fetch().await?;
        self.set(token.clone(), expires_in);
        Ok(token)
    }

    pub(crate) fn invalidate(&self) {
        if let Ok(mut guard) = self.value.lock() {
            *guard = None;
        }
    }
}
