//! Workload identity federation (`external_account`) token provider.
//!
//! Refresh flow:
//! 1) read the subject token from the configured file or URL
//! 2) exchange it at the STS endpoint for a federated access token
//! 3) optionally impersonate a service account via IAM Credentials `generateAccessToken`

use crate::auth::{CLOUD_PLATFORM_SCOPE, TokenCache, TokenProvider};
use crate::config::DEFAULT_STS_TOKEN_URL;
use crate::error::GenMediaError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
const IMPERSONATION_LIFETIME: &str = "3600s";

static IMPERSONATION_EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"serviceAccounts/([^/:]+@[^/:]+):generateAccessToken").ok());

static SA_EMAIL_PROJECT_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@]+@([a-z0-9][a-z0-9-]*)\.iam\.gserviceaccount\.com$").ok());

/// Recover the project id from a service-account email
/// (`name@project.iam.gserviceaccount.com` -> `project`).
pub fn project_from_service_account_email(email: &str) -> Option<String> {
    SA_EMAIL_PROJECT_RE
        .as_ref()?
        .captures(email.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubjectTokenFormat {
    /// `text` (default) or `json`.
    #[serde(default, rename = "type")]
    pub format_type: Option<String>,
    #[serde(default)]
    pub subject_token_field_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialSource {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub format: Option<SubjectTokenFormat>,
    #[serde(default)]
    pub environment_id: Option<String>,
    #[serde(default)]
    pub executable: Option<serde_json::Value>,
}

/// Parsed `external_account` credential configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalAccountConfig {
    #[serde(default, rename = "type")]
    pub account_type: Option<String>,
    pub audience: String,
    pub subject_token_type: String,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub service_account_impersonation_url: Option<String>,
    pub credential_source: CredentialSource,
    #[serde(default)]
    pub quota_project_id: Option<String>,
}

impl ExternalAccountConfig {
    pub fn from_json(json: &str) -> Result<Self, GenMediaError> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
            GenMediaError::ConfigurationError(format!("Invalid workload identity config: {e}"))
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, GenMediaError> {
        let cfg: Self = serde_json::from_value(value).map_err(|e| {
            GenMediaError::ConfigurationError(format!("Invalid workload identity config: {e}"))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), GenMediaError> {
        if let Some(t) = &self.account_type
            && t != "external_account"
        {
            return Err(GenMediaError::ConfigurationError(format!(
                "Workload identity config has type '{t}', expected 'external_account'"
            )));
        }
        let src = &self.credential_source;
        if src.environment_id.is_some() {
            return Err(GenMediaError::ConfigurationError(
                "AWS credential sources are not supported; use a file or url credential source"
                    .to_string(),
            ));
        }
        if src.executable.is_some() {
            return Err(GenMediaError::ConfigurationError(
                "Executable credential sources are not supported; use a file or url credential source"
                    .to_string(),
            ));
        }
        if src.file.is_none() && src.url.is_none() {
            return Err(GenMediaError::ConfigurationError(
                "Workload identity credential_source must specify 'file' or 'url'".to_string(),
            ));
        }
        if let Some(fmt) = &src.format
            && fmt.format_type.as_deref() == Some("json")
            && fmt.subject_token_field_name.is_none()
        {
            return Err(GenMediaError::ConfigurationError(
                "credential_source.format of type 'json' requires subject_token_field_name"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Email of the service account this config impersonates, if any.
    pub fn impersonated_email(&self) -> Option<String> {
        let url = self.service_account_impersonation_url.as_deref()?;
        IMPERSONATION_EMAIL_RE
            .as_ref()?
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Project id embedded in the impersonated service-account email.
    pub fn project_id(&self) -> Option<String> {
        self.impersonated_email()
            .and_then(|email| project_from_service_account_email(&email))
    }
}

#[derive(Debug, Deserialize)]
struct StsResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImpersonationResponse {
    access_token: String,
    expire_time: String,
}

/// Self-refreshing federated credential.
pub struct ExternalAccountTokenProvider {
    config: ExternalAccountConfig,
    http: reqwest::Client,
    default_sts_url: String,
    cache: TokenCache,
}

impl ExternalAccountTokenProvider {
    pub fn new(config: ExternalAccountConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            default_sts_url: DEFAULT_STS_TOKEN_URL.to_string(),
            cache: TokenCache::default(),
        }
    }

    /// STS endpoint used when the config document omits `token_url`.
    pub fn with_default_sts_url(mut self, url: impl Into<String>) -> Self {
        self.default_sts_url = url.into();
        self
    }

    pub fn config(&self) -> &ExternalAccountConfig {
        &self.config
    }

    async fn subject_token(&self) -> Result<String, GenMediaError> {
        let src = &self.config.credential_source;
        let raw = if let Some(file) = &src.file {
            tokio::fs::read_to_string(file).await.map_err(|e| {
                GenMediaError::AuthError(format!("Failed to read subject token file {file}: {e}"))
            })?
        } else if let Some(url) = &src.url {
            let mut req = self.http.get(url);
            for (k, v) in &src.headers {
                req = req.header(k, v);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| GenMediaError::AuthError(format!("Subject token request failed: {e}")))?
                .error_for_status()
                .map_err(|e| {
                    GenMediaError::AuthError(format!("Subject token endpoint returned error: {e}"))
                })?;
            resp.text().await.map_err(|e| {
                GenMediaError::AuthError(format!("Failed to read subject token response: {e}"))
            })?
        } else {
            return Err(GenMediaError::ConfigurationError(
                "Workload identity credential_source must specify 'file' or 'url'".to_string(),
            ));
        };

        match src.format.as_ref() {
            Some(fmt) if fmt.format_type.as_deref() == Some("json") => {
                let field = fmt.subject_token_field_name.as_deref().unwrap_or_default();
                let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
                    GenMediaError::AuthError(format!("Subject token is not valid JSON: {e}"))
                })?;
                value
                    .get(field)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        GenMediaError::AuthError(format!(
                            "Subject token JSON has no string field '{field}'"
                        ))
                    })
            }
            _ => Ok(raw.trim().to_string()),
        }
    }

    async fn exchange(&self, subject_token: &str) -> Result<(String, i64), GenMediaError> {
        let url = self
            .config
            .token_url
            .clone()
            .unwrap_or_else(|| self.default_sts_url.clone());
        let form = [
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("audience", self.config.audience.as_str()),
            ("scope", CLOUD_PLATFORM_SCOPE),
            ("requested_token_type", ACCESS_TOKEN_TYPE),
            ("subject_token", subject_token),
            ("subject_token_type", self.config.subject_token_type.as_str()),
        ];
        let resp = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GenMediaError::AuthError(format!("STS request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenMediaError::AuthError(format!(
                "STS token exchange returned {status}: {body}"
            )));
        }
        let sts: StsResponse = resp
            .json()
            .await
            .map_err(|e| GenMediaError::AuthError(format!("Failed to parse STS response: {e}")))?;
        Ok((sts.access_token, sts.expires_in.unwrap_or(3600)))
    }

    async fn impersonate(
        &self,
        url: &str,
        federated_token: &str,
    ) -> Result<(String, i64), GenMediaError> {
        let body = serde_json::json!({
            "scope": [CLOUD_PLATFORM_SCOPE],
            "lifetime": IMPERSONATION_LIFETIME,
        });
        let resp = self
            .http
            .post(url)
            .bearer_auth(federated_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenMediaError::AuthError(format!("Impersonation request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenMediaError::AuthError(format!(
                "Service account impersonation returned {status}: {body}"
            )));
        }
        let imp: ImpersonationResponse = resp.json().await.map_err(|e| {
            GenMediaError::AuthError(format!("Failed to parse impersonation response: {e}"))
        })?;
        let expires_at = chrono::DateTime::parse_from_rfc3339(&imp.expire_time).map_err(|e| {
            GenMediaError::AuthError(format!(
                "Invalid expireTime '{}' in impersonation response: {e}",
                imp.expire_time
            ))
        })?;
        let expires_in = expires_at.timestamp() - chrono::Utc::now().timestamp();
        Ok((imp.access_token, expires_in))
    }

    async fn fetch_new_token(&self) -> Result<(String, i64), GenMediaError> {
        let subject = self.subject_token().await?;
        let (federated, expires_in) = self.exchange(&subject).await?;
        match self.config.service_account_impersonation_url.as_deref() {
            Some(url) => {
                let out = self.impersonate(url, &federated).await?;
                tracing::debug!(
                    service_account = ?self.config.impersonated_email(),
                    "federated token exchanged and impersonated"
                );
                Ok(out)
            }
            None => {
                tracing::debug!("federated token exchanged");
                Ok((federated, expires_in))
            }
        }
    }
}

#[async_trait::async_trait]
impl TokenProvider for ExternalAccountTokenProvider {
    fn cached_token(&self) -> Option<String> {
        self.cache.get()
    }

    async fn refresh(&self) -> Result<String, GenMediaError> {
        self.cache.invalidate();
        self.cache.refresh_with(|| self.fetch_new_token()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_json(source: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "type": "external_account",
            "audience": "//iam.googleapis.com/projects/123/locations/global/workloadIdentityPools/pool/providers/prov",
            "subject_token_type": "urn:ietf:params:oauth:token-type:jwt",
            "token_url": "https://sts.googleapis.com/v1/token",
            "service_account_impersonation_url": "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/runner@media-prod.iam.gserviceaccount.com:generateAccessToken",
            "credential_source": source
        })
    }

    #[test]
    fn project_is_recovered_from_impersonated_email() {
        let cfg =
            ExternalAccountConfig::from_value(config_json(serde_json::json!({"file": "/tmp/t"})))
                .unwrap();
        assert_eq!(
            cfg.impersonated_email().as_deref(),
            Some("runner@media-prod.iam.gserviceaccount.com")
        );
        assert_eq!(cfg.project_id().as_deref(), Some("media-prod"));
    }

    #[test]
    fn email_project_parsing() {
        assert_eq!(
            project_from_service_account_email("a@my-proj.iam.gserviceaccount.com").as_deref(),
            Some("my-proj")
        );
        assert!(project_from_service_account_email("a@example.com").is_none());
    }

    #[test]
    fn aws_and_executable_sources_are_rejected() {
        let aws = config_json(serde_json::json!({"environment_id": "aws1"}));
        assert!(matches!(
            ExternalAccountConfig::from_value(aws),
            Err(GenMediaError::ConfigurationError(_))
        ));
        let exe = config_json(serde_json::json!({"executable": {"command": "x"}}));
        assert!(matches!(
            ExternalAccountConfig::from_value(exe),
            Err(GenMediaError::ConfigurationError(_))
        ));
    }

    #[test]
    fn json_format_requires_field_name() {
        let v = config_json(serde_json::json!({"url": "http://x", "format": {"type": "json"}}));
        assert!(ExternalAccountConfig::from_value(v).is_err());
    }

    #[tokio::test]
    async fn reads_json_subject_token_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, br#"{"id_token":"subject-123"}"#).unwrap();
        let v = config_json(serde_json::json!({
            "file": f.path().to_string_lossy(),
            "format": {"type": "json", "subject_token_field_name": "id_token"}
        }));
        let cfg = ExternalAccountConfig::from_value(v).unwrap();
        let provider = ExternalAccountTokenProvider::new(cfg, reqwest::Client::new());
        assert_eq!(provider.subject_token().await.unwrap(), "subject-123");
    }
}
