//! Runtime configuration.
//!
//! Everything here has a sensible default; the builder falls back to environment
//! variables the same way provider builders do (`GOOGLE_CLOUD_LOCATION`).

use crate::error::GenMediaError;
use std::time::Duration;

pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_STS_TOKEN_URL: &str = "https://sts.googleapis.com/v1/token";
pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://169.254.169.254/computeMetadata/v1/instance/service-accounts/default/token";
pub const DEFAULT_STORAGE_BASE_URL: &str = "https://storage.googleapis.com";
pub const DEFAULT_AI_STUDIO_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Poll loop limits. `None` means unbounded.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            timeout: None,
        }
    }
}

/// Token endpoints. Overridable so tests can point them at a mock server.
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    pub oauth_token_url: String,
    pub sts_token_url: String,
    pub metadata_token_url: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            oauth_token_url: DEFAULT_OAUTH_TOKEN_URL.to_string(),
            sts_token_url: DEFAULT_STS_TOKEN_URL.to_string(),
            metadata_token_url: DEFAULT_METADATA_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenMediaConfig {
    /// Vertex AI region, e.g. `us-central1` or `global`.
    pub location: String,
    pub http_timeout: Duration,
    pub poll: PollConfig,
    pub auth: AuthEndpoints,
    /// Replaces the computed Vertex publisher base URL when set.
    pub vertex_base_url: Option<String>,
    pub ai_studio_base_url: String,
    pub storage_base_url: String,
}

impl Default for GenMediaConfig {
    fn default() -> Self {
        Self {
            location: DEFAULT_LOCATION.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            poll: PollConfig::default(),
            auth: AuthEndpoints::default(),
            vertex_base_url: None,
            ai_studio_base_url: DEFAULT_AI_STUDIO_BASE_URL.to_string(),
            storage_base_url: DEFAULT_STORAGE_BASE_URL.to_string(),
        }
    }
}

impl GenMediaConfig {
    pub fn builder() -> GenMediaConfigBuilder {
        GenMediaConfigBuilder::default()
    }

    /// Build a reqwest client honouring the configured timeout.
    pub fn http_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    }

    /// Client for file-handle downloads. Redirects are not followed automatically, so the
    /// downloader can decide per hop whether credentials go along.
    pub fn download_client(&self) -> Result<reqwest::Client, GenMediaError> {
        Ok(reqwest::Client::builder()
            .timeout(self.http_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?)
    }
}

#[derive(Debug, Default)]
pub struct GenMediaConfigBuilder {
    location: Option<String>,
    http_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
    max_poll_attempts: Option<u32>,
    poll_timeout: Option<Duration>,
    auth: Option<AuthEndpoints>,
    vertex_base_url: Option<String>,
    ai_studio_base_url: Option<String>,
    storage_base_url: Option<String>,
}

impl GenMediaConfigBuilder {
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = Some(attempts);
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    pub fn auth_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.auth = Some(endpoints);
        self
    }

    pub fn vertex_base_url(mut self, url: impl Into<String>) -> Self {
        self.vertex_base_url = Some(url.into());
        self
    }

    pub fn ai_studio_base_url(mut self, url: impl Into<String>) -> Self {
        self.ai_studio_base_url = Some(url.into());
        self
    }

    pub fn storage_base_url(mut self, url: impl Into<String>) -> Self {
        self.storage_base_url = Some(url.into());
        self
    }

    pub fn build(self) -> GenMediaConfig {
        let location = self
            .location
            .or_else(|| std::env::var("GOOGLE_CLOUD_LOCATION").ok())
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        GenMediaConfig {
            location,
            http_timeout: self.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT),
            poll: PollConfig {
                interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
                max_attempts: self.max_poll_attempts,
                timeout: self.poll_timeout,
            },
            auth: self.auth.unwrap_or_default(),
            vertex_base_url: self.vertex_base_url,
            ai_studio_base_url: self
                .ai_studio_base_url
                .unwrap_or_else(|| DEFAULT_AI_STUDIO_BASE_URL.to_string()),
            storage_base_url: self
                .storage_base_url
                .unwrap_or_else(|| DEFAULT_STORAGE_BASE_URL.to_string()),
        }
    }
}
