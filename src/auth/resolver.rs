//! Credential resolution.
//!
//! Picks one identity from the configured secrets, first match wins:
//! workload identity federation, service-account key file, inline JSON, then
//! Application Default Credentials. Each resolved credential carries exactly one project id.

use crate::auth::adc::AdcTokenProvider;
use crate::auth::external_account::{ExternalAccountConfig, ExternalAccountTokenProvider};
use crate::auth::service_account::{ServiceAccountCredentials, ServiceAccountTokenProvider};
use crate::auth::TokenProvider;
use crate::config::{AuthEndpoints, GenMediaConfig};
use crate::error::GenMediaError;
use crate::logs::LogSink;
use crate::secrets::{ConfiguredSecrets, keys};
use md5::{Digest, Md5};
use secrecy::{ExposeSecret, SecretString};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Which configured source produced the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    WorkloadIdentity,
    ServiceAccountFile,
    InlineJson,
    ApplicationDefault,
}

impl CredentialSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::WorkloadIdentity => "workload identity federation",
            Self::ServiceAccountFile => "service account file",
            Self::InlineJson => "inline credentials JSON",
            Self::ApplicationDefault => "application default credentials",
        }
    }
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity handle plus a refreshable bearer token.
#[derive(Clone)]
pub struct Credential {
    source: CredentialSource,
    provider: Arc<dyn TokenProvider>,
    raw_json: SecretString,
}

impl Credential {
    pub fn new(
        source: CredentialSource,
        provider: Arc<dyn TokenProvider>,
        raw_json: impl Into<String>,
    ) -> Self {
        Self {
            source,
            provider,
            raw_json: SecretString::from(raw_json.into()),
        }
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Whether the cached token can be used without a refresh.
    pub fn is_valid(&self) -> bool {
        self.provider.is_valid()
    }

    pub fn provider(&self) -> Arc<dyn TokenProvider> {
        self.provider.clone()
    }

    pub async fn access_token(&self) -> Result<String, GenMediaError> {
        get_access_token(Some(self)).await
    }

    /// Short digest of the credential document. Tells identities apart without exposing them.
    pub fn fingerprint(&self) -> String {
        let digest = Md5::digest(self.raw_json.expose_secret().as_bytes());
        hex::encode(&digest[..8])
    }

    /// Write the credential document to a private temp file for transports that only
    /// accept a credentials path. The file is removed when the handle is dropped.
    pub fn write_credentials_file(&self) -> Result<tempfile::NamedTempFile, GenMediaError> {
        let mut file = tempfile::Builder::new()
            .prefix("genmedia-credentials-")
            .suffix(".json")
            .tempfile()?;
        file.write_all(self.raw_json.expose_secret().as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

/// Result of `CredentialResolver::resolve`.
///
/// `credential` is `None` for Application Default Credentials: the transport discovers the
/// identity itself. Raw REST callers go through `bearer_token` with an explicit ADC lookup.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    credential: Option<Credential>,
    project_id: String,
    source: CredentialSource,
}

impl ResolvedCredentials {
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Key for per-identity caches: the same project reached through another source or
    /// another credential document gets its own entry.
    pub fn cache_key(&self) -> String {
        let identity = self
            .credential
            .as_ref()
            .map(Credential::fingerprint)
            .unwrap_or_else(|| "adc".to_string());
        format!("{}|{:?}|{identity}", self.project_id, self.source)
    }

    pub fn into_parts(self) -> (Option<Credential>, String) {
        (self.credential, self.project_id)
    }

    /// Bearer token for raw REST calls, falling back to an explicit ADC lookup.
    pub async fn bearer_token(&self, adc: &AdcTokenProvider) -> Result<String, GenMediaError> {
        match &self.credential {
            Some(cred) => get_access_token(Some(cred)).await,
            None => adc.token().await,
        }
    }
}

/// Return a bearer token, refreshing first when the cached one is missing or expired.
pub async fn get_access_token(credential: Option<&Credential>) -> Result<String, GenMediaError> {
    let Some(cred) = credential else {
        return Err(GenMediaError::AuthError(
            "No credential available; Application Default Credentials require an explicit lookup"
                .to_string(),
        ));
    };
    if !cred.provider.is_valid() {
        tracing::debug!(source = %cred.source, "credential expired, refreshing");
        return cred.provider.refresh().await;
    }
    cred.provider.token().await
}

/// Resolves credentials and project id from the configured secrets.
pub struct CredentialResolver {
    http: reqwest::Client,
    endpoints: AuthEndpoints,
}

impl CredentialResolver {
    pub fn new(config: &GenMediaConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            endpoints: config.auth.clone(),
        }
    }

    /// ADC provider wired to the configured metadata endpoint.
    pub fn adc_provider(&self) -> AdcTokenProvider {
        AdcTokenProvider::new(self.http.clone())
            .with_metadata_url(self.endpoints.metadata_token_url.clone())
    }

    pub async fn resolve(
        &self,
        secrets: &ConfiguredSecrets,
        log: &dyn LogSink,
    ) -> Result<ResolvedCredentials, GenMediaError> {
        let configured_project = secrets.project_id.clone();

        // 1. workload identity federation
        if let Some(path) = secrets.workload_identity_config_path.as_deref()
            && let Some(contents) =
                read_if_exists(path, keys::WORKLOAD_IDENTITY_CONFIG_PATH, log).await?
        {
            log.info(&format!("🔐 Using Workload Identity Federation from: {path}"));
            let config = ExternalAccountConfig::from_json(&contents)?;
            let resolved = self.federated(
                config,
                contents,
                CredentialSource::WorkloadIdentity,
                configured_project,
            )?;
            log.info(&format!("✅ Project ID: {}", resolved.project_id));
            return Ok(resolved);
        }

        // 2. service-account key file
        if let Some(path) = secrets.service_account_file_path.as_deref()
            && let Some(contents) =
                read_if_exists(path, keys::SERVICE_ACCOUNT_FILE_PATH, log).await?
        {
            log.info(&format!("🔑 Using service account file: {path}"));
            let value = parse_json(&contents, keys::SERVICE_ACCOUNT_FILE_PATH)?;
            let resolved = if is_external_account(&value) {
                let config = ExternalAccountConfig::from_value(value)?;
                self.federated(
                    config,
                    contents,
                    CredentialSource::ServiceAccountFile,
                    configured_project,
                )?
            } else {
                let creds = ServiceAccountCredentials::from_value(value)?;
                let project_id = creds.project_id.clone().ok_or_else(|| {
                    GenMediaError::ConfigurationError(format!(
                        "Service account file {path} has no project_id"
                    ))
                })?;
                self.service_account(
                    creds,
                    contents,
                    CredentialSource::ServiceAccountFile,
                    project_id,
                )
            };
            log.info(&format!("✅ Project ID: {}", resolved.project_id));
            return Ok(resolved);
        }

        // 3. inline JSON
        if let Some(json) = secrets.credentials_json_str() {
            log.info("🔑 Using credentials JSON from settings");
            let value = parse_json(json, keys::CREDENTIALS_JSON)?;
            let resolved = if is_external_account(&value) {
                let config = ExternalAccountConfig::from_value(value)?;
                self.federated(
                    config,
                    json.to_string(),
                    CredentialSource::InlineJson,
                    configured_project,
                )?
            } else {
                let creds = ServiceAccountCredentials::from_value(value)?;
                let project_id = creds
                    .project_id
                    .clone()
                    .or(configured_project)
                    .ok_or_else(|| {
                        GenMediaError::ConfigurationError(format!(
                            "Credentials JSON has no project_id and {} is not set",
                            keys::PROJECT_ID
                        ))
                    })?;
                self.service_account(
                    creds,
                    json.to_string(),
                    CredentialSource::InlineJson,
                    project_id,
                )
            };
            log.info(&format!("✅ Project ID: {}", resolved.project_id));
            return Ok(resolved);
        }

        // 4. application default credentials
        if let Some(project_id) = configured_project {
            log.info("🔑 Using Application Default Credentials");
            log.info(&format!("✅ Project ID: {project_id}"));
            return Ok(ResolvedCredentials {
                credential: None,
                project_id,
                source: CredentialSource::ApplicationDefault,
            });
        }

        Err(GenMediaError::ConfigurationError(format!(
            "No Google Cloud credentials configured. Set {}, {}, {} (with {}), or {} alone for Application Default Credentials",
            keys::WORKLOAD_IDENTITY_CONFIG_PATH,
            keys::SERVICE_ACCOUNT_FILE_PATH,
            keys::CREDENTIALS_JSON,
            keys::PROJECT_ID,
            keys::PROJECT_ID,
        )))
    }

    /// The AI Studio API key, for nodes running against the Gemini API instead of Vertex.
    pub fn resolve_api_key(
        &self,
        secrets: &ConfiguredSecrets,
    ) -> Result<SecretString, GenMediaError> {
        secrets.api_key.clone().ok_or_else(|| {
            GenMediaError::ConfigurationError(format!(
                "{} is not set; it is required when using the Gemini API provider",
                keys::API_KEY
            ))
        })
    }

    fn federated(
        &self,
        config: ExternalAccountConfig,
        raw_json: String,
        source: CredentialSource,
        configured_project: Option<String>,
    ) -> Result<ResolvedCredentials, GenMediaError> {
        let project_id = config.project_id().or(configured_project).ok_or_else(|| {
            GenMediaError::ConfigurationError(format!(
                "Could not determine the project id from the workload identity config; set {}",
                keys::PROJECT_ID
            ))
        })?;
        let provider = ExternalAccountTokenProvider::new(config, self.http.clone())
            .with_default_sts_url(self.endpoints.sts_token_url.clone());
        Ok(ResolvedCredentials {
            credential: Some(Credential::new(source, Arc::new(provider), raw_json)),
            project_id,
            source,
        })
    }

    fn service_account(
        &self,
        mut creds: ServiceAccountCredentials,
        raw_json: String,
        source: CredentialSource,
        project_id: String,
    ) -> ResolvedCredentials {
        if creds.token_uri.is_none() {
            creds.token_uri = Some(self.endpoints.oauth_token_url.clone());
        }
        tracing::debug!(client_email = %creds.client_email, %project_id, "service account credential built");
        let provider = ServiceAccountTokenProvider::new(creds, self.http.clone(), None);
        ResolvedCredentials {
            credential: Some(Credential::new(source, Arc::new(provider), raw_json)),
            project_id,
            source,
        }
    }
}

/// `Ok(None)` when the configured path does not exist; the next source is tried.
async fn read_if_exists(
    path: &str,
    key: &str,
    log: &dyn LogSink,
) -> Result<Option<String>, GenMediaError> {
    if !Path::new(path).exists() {
        log.warn(&format!("⚠️ {key} is set but {path} does not exist, skipping"));
        return Ok(None);
    }
    tokio::fs::read_to_string(path).await.map(Some).map_err(|e| {
        GenMediaError::ConfigurationError(format!("Failed to read {key} file {path}: {e}"))
    })
}

fn parse_json(contents: &str, key: &str) -> Result<serde_json::Value, GenMediaError> {
    serde_json::from_str(contents)
        .map_err(|e| GenMediaError::ConfigurationError(format!("{key} is not valid JSON: {e}")))
}

fn is_external_account(value: &serde_json::Value) -> bool {
    value.get("type").and_then(|t| t.as_str()) == Some("external_account")
}
