//! Generator nodes.
//!
//! A node reads its declared parameters, builds a `GenerationRequest`, and turns the
//! provider response into persisted artifacts. `NodeRunner` owns everything the nodes
//! share: credential resolution, transport setup, extraction, persistence and the
//! reset-on-failure contract.

use crate::adapters::{Provider, RawResult};
use crate::auth::{CredentialResolver, TokenProvider};
use crate::config::GenMediaConfig;
use crate::error::GenMediaError;
use crate::logs::{LogSink, NodeLog};
use crate::media::{
    InputPolicy, MediaInput, MediaKind, PreparedMedia, ResponsePartExtractor, artifact_filename,
    prepare_inputs,
};
use crate::operation::OperationPoller;
use crate::persist::{Artifact, ArtifactPersister, Clock, ConflictPolicy, SystemClock};
use crate::request::GenerationRequest;
use crate::secrets::{ConfiguredSecrets, SecretsStore};
use crate::storage::{GcsDownloader, HttpFileDownloader, StorageClientPool, StorageDownloader};
use crate::transport::VertexTransport;
use crate::utils::CancelHandle;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Instrument;

pub mod generators;

pub use generators::{
    GeminiAnalyzeMediaNode, GeminiImageNode, ImagenNode, LyriaAudioNode, VeoVideoNode,
};

/// Parameter selecting the backend: `vertex` (default) or `gemini_api`.
pub const API_PROVIDER_PARAM: &str = "api_provider";

/// Which Google backend a node talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiProvider {
    #[default]
    Vertex,
    /// Gemini API (AI Studio), authenticated with an API key.
    GeminiApi,
}

impl ApiProvider {
    pub fn parse(value: &str) -> Result<Self, GenMediaError> {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "" | "vertex" | "vertex_ai" => Ok(Self::Vertex),
            "gemini_api" | "ai_studio" | "gemini" => Ok(Self::GeminiApi),
            other => Err(GenMediaError::InvalidParameter(format!(
                "Unknown {API_PROVIDER_PARAM} '{other}'; expected 'vertex' or 'gemini_api'"
            ))),
        }
    }
}

/// Declared parameters (name → value) plus any input media.
#[derive(Debug, Clone, Default)]
pub struct NodeParameters {
    values: Map<String, Value>,
    inputs: Vec<MediaInput>,
}

impl NodeParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_input(mut self, input: MediaInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    /// Non-blank string value.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Numbers, or strings holding a number.
    pub fn f64(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn u64(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn require_str(&self, name: &str) -> Result<&str, GenMediaError> {
        self.str(name).ok_or_else(|| {
            GenMediaError::InvalidParameter(format!("Parameter '{name}' is required"))
        })
    }

    pub fn inputs(&self) -> &[MediaInput] {
        &self.inputs
    }

    pub fn api_provider(&self) -> Result<ApiProvider, GenMediaError> {
        self.str(API_PROVIDER_PARAM)
            .map(ApiProvider::parse)
            .unwrap_or(Ok(ApiProvider::Vertex))
    }
}

/// Grid slot for the `index`-th artifact of a kind: two columns, row-major, 1-based.
pub fn slot_name(kind: MediaKind, index: usize) -> String {
    format!("{}_{}_{}", kind.slot_prefix(), index / 2 + 1, index % 2 + 1)
}

/// What a node hands back to the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutputs {
    pub artifacts: Vec<Artifact>,
    pub text: Option<String>,
    pub logs: String,
    /// Grid slot name → artifact.
    pub slots: BTreeMap<String, Artifact>,
}

impl NodeOutputs {
    /// Clear every output so nothing stale survives a failed run.
    pub fn reset(&mut self) {
        self.artifacts.clear();
        self.text = None;
        self.logs.clear();
        self.slots.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty() && self.text.is_none()
    }
}

/// Per-invocation handles a node uses to reach the provider.
pub struct GenerationContext<'a> {
    pub transport: &'a VertexTransport,
    pub poller: &'a OperationPoller,
    pub log: &'a dyn LogSink,
}

#[async_trait::async_trait]
pub trait GeneratorNode: Send + Sync {
    /// Display name used in logs.
    fn name(&self) -> &'static str;

    fn provider(&self) -> Provider;

    /// Media the node produces; drives slot names and MIME fallback.
    fn media_kind(&self) -> MediaKind;

    /// Logical prefix of artifact filenames.
    fn artifact_prefix(&self) -> &'static str;

    fn input_policy(&self) -> InputPolicy {
        InputPolicy::images()
    }

    /// Vertex region used when the `location` parameter is not set. `None` defers to the config.
    fn default_location(&self) -> Option<&'static str> {
        None
    }

    fn build_request(
        &self,
        params: &NodeParameters,
        inputs: Vec<PreparedMedia>,
    ) -> Result<GenerationRequest, GenMediaError>;

    async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        request: &GenerationRequest,
    ) -> Result<RawResult, GenMediaError>;
}

/// Composes resolver → generator → extractor → persister for one node invocation.
pub struct NodeRunner {
    config: GenMediaConfig,
    http: reqwest::Client,
    resolver: CredentialResolver,
    secrets: Arc<dyn SecretsStore>,
    persister: Arc<dyn ArtifactPersister>,
    clock: Arc<dyn Clock>,
    storage_pool: Arc<StorageClientPool>,
    cancel: CancelHandle,
    trusted_file_origins: Vec<reqwest::Url>,
}

impl NodeRunner {
    pub fn new(
        config: GenMediaConfig,
        secrets: Arc<dyn SecretsStore>,
        persister: Arc<dyn ArtifactPersister>,
    ) -> Self {
        let http = config.http_client();
        let resolver = CredentialResolver::new(&config, http.clone());
        Self {
            config,
            http,
            resolver,
            secrets,
            persister,
            clock: Arc::new(SystemClock),
            storage_pool: Arc::new(StorageClientPool::default()),
            cancel: CancelHandle::new(),
            trusted_file_origins: Vec::new(),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.resolver = CredentialResolver::new(&self.config, http.clone());
        self.http = http;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_storage_pool(mut self, pool: Arc<StorageClientPool>) -> Self {
        self.storage_pool = pool;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Also send file-download credentials to `origin` (scheme, host and port must match).
    pub fn trust_file_origin(mut self, origin: reqwest::Url) -> Self {
        self.trusted_file_origins.push(origin);
        self
    }

    /// Run `node`, writing into `outputs`.
    ///
    /// On failure the outputs are reset, the log carries the classified error lines, and
    /// the error is returned for hosts that surface structured errors.
    pub async fn run(
        &self,
        node: &dyn GeneratorNode,
        params: &NodeParameters,
        outputs: &mut NodeOutputs,
    ) -> Result<(), GenMediaError> {
        let log = NodeLog::new();
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("node_run", node = node.name(), %run_id);

        let result = self.execute(node, params, &log).instrument(span).await;
        match result {
            Ok(done) => {
                *outputs = done;
                outputs.logs = log.text();
                Ok(())
            }
            Err(e) => {
                for line in e.log_lines() {
                    log.warn(&line);
                }
                tracing::error!(node = node.name(), %run_id, error = %e, "node run failed");
                outputs.reset();
                outputs.logs = log.text();
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        node: &dyn GeneratorNode,
        params: &NodeParameters,
        log: &NodeLog,
    ) -> Result<NodeOutputs, GenMediaError> {
        let api = params.api_provider()?;
        let secrets = ConfiguredSecrets::load(self.secrets.as_ref());

        let inputs = prepare_inputs(
            params.inputs().to_vec(),
            &node.input_policy(),
            &self.http,
            log,
        )
        .await;
        let request = node.build_request(params, inputs)?;

        let mut extractor = ResponsePartExtractor::new().with_fallback_kind(node.media_kind());
        let download_http = self.config.download_client()?;
        let transport = match api {
            ApiProvider::Vertex => {
                let resolved = self.resolver.resolve(&secrets, log).await?;
                let tokens: Arc<dyn TokenProvider> = match resolved.credential() {
                    Some(cred) => cred.provider(),
                    None => Arc::new(self.resolver.adc_provider()),
                };
                let location = params
                    .str("location")
                    .or(node.default_location())
                    .unwrap_or(self.config.location.as_str());
                let storage = self.storage_pool.get_or_insert_with(&resolved.cache_key(), || {
                    Arc::new(
                        GcsDownloader::new(self.http.clone(), tokens.clone())
                            .with_base_url(self.config.storage_base_url.clone()),
                    ) as Arc<dyn StorageDownloader>
                });
                let files = HttpFileDownloader::with_bearer(download_http, tokens.clone())
                    .with_trusted_origins(&self.trusted_file_origins);
                extractor = extractor.with_storage(storage).with_files(Arc::new(files));
                VertexTransport::for_project(
                    &self.config,
                    self.http.clone(),
                    resolved.project_id(),
                    location,
                    tokens,
                )
            }
            ApiProvider::GeminiApi => {
                log.info("🔑 Using Gemini API key");
                let key = self.resolver.resolve_api_key(&secrets)?;
                let files = HttpFileDownloader::with_api_key(download_http, key.clone())
                    .with_trusted_origins(&self.trusted_file_origins);
                extractor = extractor.with_files(Arc::new(files));
                VertexTransport::ai_studio(
                    self.http.clone(),
                    self.config.ai_studio_base_url.clone(),
                    key,
                )
            }
        };

        let poller = OperationPoller::from_config(&self.config.poll).with_cancel(self.cancel.child());
        let ctx = GenerationContext {
            transport: &transport,
            poller: &poller,
            log,
        };

        log.info(&format!("🚀 {}: generating with model {}", node.name(), request.model));
        let raw = node.generate(&ctx, &request).await?;
        let extracted = extractor.extract_raw(&raw, log).await?;

        let mut outputs = NodeOutputs {
            text: extracted.text,
            ..Default::default()
        };
        if extracted.media.is_empty() && outputs.text.is_none() {
            log.warn("⚠️ No media was returned");
        }

        let mut per_kind: BTreeMap<&'static str, usize> = BTreeMap::new();
        for media in extracted.media {
            if self.cancel.is_cancelled() {
                return Err(GenMediaError::Cancelled);
            }
            let kind = media.kind().unwrap_or(node.media_kind());
            let filename = artifact_filename(
                node.artifact_prefix(),
                self.clock.now_millis(),
                &media.bytes,
                &media.mime,
            );
            let url = self
                .persister
                .save(&media.bytes, &filename, ConflictPolicy::CreateNew)
                .await?;
            log.info(&format!("💾 Saved {filename}"));

            let artifact = Artifact {
                url,
                name: filename,
                mime: media.mime,
            };
            let index = per_kind.entry(kind.slot_prefix()).or_insert(0);
            outputs.slots.insert(slot_name(kind, *index), artifact.clone());
            *index += 1;
            outputs.artifacts.push(artifact);
        }

        log.info(&format!(
            "✅ {}: {} artifact(s) saved",
            node.name(),
            outputs.artifacts.len()
        ));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slots_fill_two_columns() {
        let names: Vec<_> = (0..5).map(|i| slot_name(MediaKind::Image, i)).collect();
        assert_eq!(
            names,
            vec!["image_1_1", "image_1_2", "image_2_1", "image_2_2", "image_3_1"]
        );
        assert_eq!(slot_name(MediaKind::Video, 1), "video_1_2");
    }

    #[test]
    fn parameters_coerce_strings() {
        let p = NodeParameters::new()
            .with("seed", "42")
            .with("temperature", json!(0.7))
            .with("prompt", "   ")
            .with("enhance", "yes");
        assert_eq!(p.u64("seed"), Some(42));
        assert_eq!(p.f64("temperature"), Some(0.7));
        assert!(p.str("prompt").is_none());
        assert!(p.require_str("prompt").is_err());
        assert_eq!(p.bool("enhance"), Some(true));
    }

    #[test]
    fn api_provider_parsing() {
        assert_eq!(NodeParameters::new().api_provider().unwrap(), ApiProvider::Vertex);
        let p = NodeParameters::new().with(API_PROVIDER_PARAM, "Gemini API");
        assert_eq!(p.api_provider().unwrap(), ApiProvider::GeminiApi);
        let p = NodeParameters::new().with(API_PROVIDER_PARAM, "bedrock");
        assert!(matches!(
            p.api_provider(),
            Err(GenMediaError::InvalidParameter(_))
        ));
    }

    #[test]
    fn reset_clears_everything() {
        let mut out = NodeOutputs {
            text: Some("t".into()),
            logs: "l".into(),
            ..Default::default()
        };
        out.artifacts.push(Artifact {
            url: "file:///a".into(),
            name: "a".into(),
            mime: "image/png".into(),
        });
        out.reset();
        assert!(out.is_empty());
        assert!(out.logs.is_empty());
    }
}
