//! Cloud Storage downloads over the JSON API.

use super::{Downloaded, StorageDownloader, StorageUri};
use crate::auth::TokenProvider;
use crate::config::DEFAULT_STORAGE_BASE_URL;
use crate::error::GenMediaError;
use crate::retry::{RetryExecutor, RetryPolicy};
use std::sync::Arc;

/// Downloads `gs://bucket/object` via `GET /storage/v1/b/{bucket}/o/{object}?alt=media`.
pub struct GcsDownloader {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    retry: RetryExecutor,
}

impl GcsDownloader {
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            base_url: DEFAULT_STORAGE_BASE_URL.to_string(),
            tokens,
            retry: RetryExecutor::new(RetryPolicy::default()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    pub fn object_url(&self, uri: &StorageUri) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}?alt=media",
            self.base_url,
            urlencoding::encode(&uri.bucket),
            urlencoding::encode(&uri.object)
        )
    }

    async fn fetch_once(&self, url: &str) -> Result<Downloaded, GenMediaError> {
        let token = self.tokens.token().await?;
        let resp = self.http.get(url).bearer_auth(token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenMediaError::api_error(
                status.as_u16(),
                format!("Cloud Storage download failed: {body}"),
            ));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await?;
        Ok(Downloaded {
            bytes,
            content_type,
        })
    }
}

#[async_trait::async_trait]
impl StorageDownloader for GcsDownloader {
    async fn download(&self, uri: &StorageUri) -> Result<Downloaded, GenMediaError> {
        if !uri.is_gcs() {
            return Err(GenMediaError::UnsupportedMediaError(format!(
                "Unsupported storage scheme '{}' in {uri}",
                uri.scheme
            )));
        }
        let url = self.object_url(uri);
        tracing::debug!(%uri, "downloading from Cloud Storage");
        self.retry.execute(|| self.fetch_once(&url)).await
    }
}
