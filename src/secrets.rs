//! Secrets store seam.
//!
//! The host owns the secrets; this crate only reads them. `ConfiguredSecrets` is the
//! read-only snapshot taken once per node invocation and handed to the resolver.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// Secret key names consumed by the credential resolver.
pub mod keys {
    pub const WORKLOAD_IDENTITY_CONFIG_PATH: &str = "GOOGLE_WORKLOAD_IDENTITY_CONFIG_PATH";
    pub const SERVICE_ACCOUNT_FILE_PATH: &str = "GOOGLE_SERVICE_ACCOUNT_FILE_PATH";
    pub const CREDENTIALS_JSON: &str = "GOOGLE_APPLICATION_CREDENTIALS_JSON";
    pub const PROJECT_ID: &str = "GOOGLE_CLOUD_PROJECT_ID";
    pub const API_KEY: &str = "GOOGLE_API_KEY";

    /// Every key, in resolution order.
    pub const ALL: [&str; 5] = [
        WORKLOAD_IDENTITY_CONFIG_PATH,
        SERVICE_ACCOUNT_FILE_PATH,
        CREDENTIALS_JSON,
        PROJECT_ID,
        API_KEY,
    ];
}

/// External secrets store.
pub trait SecretsStore: Send + Sync {
    fn get_secret(&self, key: &str) -> Option<String>;
}

/// In-memory store, mostly for tests and embedding hosts.
#[derive(Default, Clone)]
pub struct MapSecrets {
    values: HashMap<String, String>,
}

impl MapSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl SecretsStore for MapSecrets {
    fn get_secret(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Reads secrets from process environment variables of the same name.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl SecretsStore for EnvSecrets {
    fn get_secret(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Read-only snapshot of the secrets this crate consumes.
///
/// Blank values are treated as unset.
#[derive(Clone, Default)]
pub struct ConfiguredSecrets {
    pub workload_identity_config_path: Option<String>,
    pub service_account_file_path: Option<String>,
    pub credentials_json: Option<SecretString>,
    pub project_id: Option<String>,
    pub api_key: Option<SecretString>,
}

impl ConfiguredSecrets {
    pub fn load(store: &dyn SecretsStore) -> Self {
        let get = |key: &str| {
            store
                .get_secret(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            workload_identity_config_path: get(keys::WORKLOAD_IDENTITY_CONFIG_PATH),
            service_account_file_path: get(keys::SERVICE_ACCOUNT_FILE_PATH),
            credentials_json: get(keys::CREDENTIALS_JSON).map(SecretString::from),
            project_id: get(keys::PROJECT_ID),
            api_key: get(keys::API_KEY).map(SecretString::from),
        }
    }

    pub fn has_any_credential_source(&self) -> bool {
        self.workload_identity_config_path.is_some()
            || self.service_account_file_path.is_some()
            || self.credentials_json.is_some()
            || self.project_id.is_some()
    }

    pub(crate) fn credentials_json_str(&self) -> Option<&str> {
        self.credentials_json.as_ref().map(|s| s.expose_secret())
    }
}

impl std::fmt::Debug for ConfiguredSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredSecrets")
            .field(
                "workload_identity_config_path",
                &self.workload_identity_config_path,
            )
            .field("service_account_file_path", &self.service_account_file_path)
            .field("has_credentials_json", &self.credentials_json.is_some())
            .field("project_id", &self.project_id)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}
