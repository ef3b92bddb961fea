//! Provider file-handle downloads.
//!
//! File handles are HTTPS URIs (Gemini Files API, Veo download links). Credentials are
//! attached only for Google hosts and explicitly trusted origins. Redirects are followed
//! here, one hop at a time, so every hop is re-checked before credentials go out; the
//! client handed in must not follow redirects itself (`GenMediaConfig::download_client`).

use super::FileDownloader;
use crate::auth::TokenProvider;
use crate::error::GenMediaError;
use futures::StreamExt;
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

const MAX_REDIRECTS: usize = 10;

const GOOGLE_DOMAINS: &[&str] = &[
    "googleapis.com",
    "googleusercontent.com",
    "gstatic.com",
    "google.com",
];

/// `host` is one of the Google domains or a subdomain of one.
fn is_google_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    GOOGLE_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

#[derive(Clone)]
enum FileAuth {
    None,
    Bearer(Arc<dyn TokenProvider>),
    ApiKey(SecretString),
}

pub struct HttpFileDownloader {
    http: reqwest::Client,
    auth: FileAuth,
    /// Extra origins (scheme, host, port) that receive credentials, e.g. a local emulator.
    trusted_origins: Vec<Url>,
}

impl HttpFileDownloader {
    pub fn anonymous(http: reqwest::Client) -> Self {
        Self::with_auth(http, FileAuth::None)
    }

    pub fn with_bearer(http: reqwest::Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_auth(http, FileAuth::Bearer(tokens))
    }

    pub fn with_api_key(http: reqwest::Client, api_key: SecretString) -> Self {
        Self::with_auth(http, FileAuth::ApiKey(api_key))
    }

    fn with_auth(http: reqwest::Client, auth: FileAuth) -> Self {
        Self {
            http,
            auth,
            trusted_origins: Vec::new(),
        }
    }

    /// Also send credentials to `origin`.
    pub fn with_trusted_origin(mut self, origin: &Url) -> Self {
        self.trusted_origins.push(origin.clone());
        self
    }

    pub fn with_trusted_origins<'a>(mut self, origins: impl IntoIterator<Item = &'a Url>) -> Self {
        self.trusted_origins.extend(origins.into_iter().cloned());
        self
    }

    fn is_trusted(&self, url: &Url) -> bool {
        let origin = url.origin();
        if self.trusted_origins.iter().any(|t| t.origin() == origin) {
            return true;
        }
        url.scheme() == "https" && url.host_str().is_some_and(is_google_host)
    }

    async fn authorize(
        &self,
        req: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<reqwest::RequestBuilder, GenMediaError> {
        if !self.is_trusted(url) {
            if !matches!(self.auth, FileAuth::None) {
                tracing::debug!(host = url.host_str(), "not sending credentials to untrusted host");
            }
            return Ok(req);
        }
        Ok(match &self.auth {
            FileAuth::None => req,
            FileAuth::Bearer(tokens) => req.bearer_auth(tokens.token().await?),
            FileAuth::ApiKey(key) => req.header("x-goog-api-key", key.expose_secret()),
        })
    }
}

#[async_trait::async_trait]
impl FileDownloader for HttpFileDownloader {
    async fn download_to(
        &self,
        handle: &str,
        dest: &Path,
    ) -> Result<Option<String>, GenMediaError> {
        let mut url = Url::parse(handle)
            .map_err(|e| GenMediaError::ParseError(format!("Invalid file handle URI: {e}")))?;

        for _ in 0..MAX_REDIRECTS {
            let req = self.authorize(self.http.get(url.clone()), &url).await?;
            let resp = req
                .send()
                .await
                .map_err(|e| GenMediaError::HttpError(format!("Failed to download file: {e}")))?;

            if resp.status().is_success() {
                let content_type = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let mut file = tokio::fs::File::create(dest).await?;
                let mut stream = resp.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| {
                        GenMediaError::HttpError(format!("Failed to read file bytes: {e}"))
                    })?;
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                return Ok(content_type);
            }

            if matches!(
                resp.status(),
                StatusCode::MOVED_PERMANENTLY
                    | StatusCode::FOUND
                    | StatusCode::SEE_OTHER
                    | StatusCode::TEMPORARY_REDIRECT
                    | StatusCode::PERMANENT_REDIRECT
            ) {
                let Some(location) = resp.headers().get(reqwest::header::LOCATION) else {
                    break;
                };
                let location = location.to_str().unwrap_or_default();
                url = url
                    .join(location)
                    .or_else(|_| Url::parse(location))
                    .map_err(|e| GenMediaError::HttpError(format!("Invalid redirect URL: {e}")))?;
                continue;
            }

            return Err(GenMediaError::api_error(
                resp.status().as_u16(),
                format!("File download returned HTTP {}", resp.status()),
            ));
        }

        Err(GenMediaError::HttpError(
            "Too many redirects while downloading file".to_string(),
        ))
    }
}
