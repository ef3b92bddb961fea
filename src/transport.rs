//! REST transport for Vertex AI and the Gemini API (AI Studio).
//!
//! Vertex calls go to `{base}/models/{model}:{method}` with a Bearer token; AI Studio
//! calls use the same path shape under its own base URL with an `x-goog-api-key` header.

use crate::auth::TokenProvider;
use crate::config::GenMediaConfig;
use crate::error::GenMediaError;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::utils::{model_method_url, vertex_base_url};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Clone)]
enum TransportAuth {
    Bearer(Arc<dyn TokenProvider>),
    ApiKey(SecretString),
}

#[derive(Clone)]
pub struct VertexTransport {
    http: reqwest::Client,
    base_url: String,
    auth: TransportAuth,
    retry: RetryExecutor,
}

impl std::fmt::Debug for VertexTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth = match self.auth {
            TransportAuth::Bearer(_) => "bearer",
            TransportAuth::ApiKey(_) => "api_key",
        };
        f.debug_struct("VertexTransport")
            .field("base_url", &self.base_url)
            .field("auth", &auth)
            .finish()
    }
}

impl VertexTransport {
    /// Vertex AI publisher endpoint with Bearer auth.
    pub fn vertex(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth: TransportAuth::Bearer(tokens),
            retry: RetryExecutor::new(RetryPolicy::default()),
        }
    }

    /// Vertex AI for `project_id` in `location`, honouring a configured base URL override.
    pub fn for_project(
        config: &GenMediaConfig,
        http: reqwest::Client,
        project_id: &str,
        location: &str,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let base = config
            .vertex_base_url
            .clone()
            .unwrap_or_else(|| vertex_base_url(project_id, location, "google"));
        Self::vertex(http, base, tokens)
    }

    /// Gemini API (AI Studio) with an API key.
    pub fn ai_studio(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: SecretString,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth: TransportAuth::ApiKey(api_key),
            retry: RetryExecutor::new(RetryPolicy::default()),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_ai_studio(&self) -> bool {
        matches!(self.auth, TransportAuth::ApiKey(_))
    }

    async fn headers(&self) -> Result<HeaderMap, GenMediaError> {
        let mut headers = HeaderMap::new();
        match &self.auth {
            TransportAuth::Bearer(tokens) => {
                let token = tokens.token().await?;
                let value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| GenMediaError::AuthError(format!("Invalid access token: {e}")))?;
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
            TransportAuth::ApiKey(key) => {
                let value = HeaderValue::from_str(key.expose_secret()).map_err(|e| {
                    GenMediaError::ConfigurationError(format!("Invalid API key: {e}"))
                })?;
                headers.insert("x-goog-api-key", value);
            }
        }
        Ok(headers)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Value, GenMediaError> {
        let resp = req.headers(self.headers().await?).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| GenMediaError::ParseError(format!("Invalid JSON response: {e}")))
    }

    async fn post_model(
        &self,
        model: &str,
        method: &str,
        body: &Value,
    ) -> Result<Value, GenMediaError> {
        let url = model_method_url(&self.base_url, model, method);
        tracing::debug!(%url, "POST");
        self.send(self.http.post(url).json(body)).await
    }

    pub async fn generate_content(&self, model: &str, body: &Value) -> Result<Value, GenMediaError> {
        self.post_model(model, "generateContent", body).await
    }

    pub async fn predict(&self, model: &str, body: &Value) -> Result<Value, GenMediaError> {
        self.post_model(model, "predict", body).await
    }

    /// Submit a long-running prediction; returns the operation resource.
    pub async fn predict_long_running(
        &self,
        model: &str,
        body: &Value,
    ) -> Result<Value, GenMediaError> {
        self.post_model(model, "predictLongRunning", body).await
    }

    /// Current state of a long-running prediction. Transport failures are retried; the
    /// request has no side effects.
    pub async fn fetch_predict_operation(
        &self,
        model: &str,
        operation_name: &str,
    ) -> Result<Value, GenMediaError> {
        self.retry
            .execute(move || async move {
                if self.is_ai_studio() {
                    // The Gemini API exposes operations as plain resources.
                    let url = format!("{}/{}", self.base_url, operation_name.trim_start_matches('/'));
                    self.send(self.http.get(url)).await
                } else {
                    let body = json!({ "operationName": operation_name });
                    self.post_model(model, "fetchPredictOperation", &body).await
                }
            })
            .await
    }
}

/// Map a non-success response, keeping the `error.message` when the body has one.
fn api_error(code: u16, body: &str) -> GenMediaError {
    let details = serde_json::from_str::<Value>(body).ok();
    let message = details
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    GenMediaError::ApiError {
        code,
        message,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn vertex(server: &MockServer) -> VertexTransport {
        VertexTransport::vertex(
            reqwest::Client::new(),
            format!("{}/v1/projects/p/locations/us-central1/publishers/google", server.uri()),
            Arc::new(StaticTokenProvider::new("tok")),
        )
        .with_retry_policy(
            RetryPolicy::default()
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        )
    }

    #[tokio::test]
    async fn predict_posts_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/v1/projects/p/locations/us-central1/publishers/google/models/imagen-4.0-generate-001:predict",
            ))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"predictions": []})))
            .expect(1)
            .mount(&server)
            .await;

        let out = vertex(&server)
            .predict("imagen-4.0-generate-001", &json!({"instances": []}))
            .await
            .unwrap();
        assert_eq!(out, json!({"predictions": []}));
    }

    #[tokio::test]
    async fn error_message_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "Image too large", "status": "INVALID_ARGUMENT"}
            })))
            .mount(&server)
            .await;

        let err = vertex(&server)
            .generate_content("gemini-2.5-flash-image", &json!({}))
            .await
            .unwrap_err();
        match err {
            GenMediaError::ApiError { code, message, details } => {
                assert_eq!(code, 400);
                assert_eq!(message, "Image too large");
                assert!(details.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_operation_retries_server_errors() {
        let server = MockServer::start().await;
        let op_path = "/v1/projects/p/locations/us-central1/publishers/google/models/veo-3.0-generate-001:fetchPredictOperation";
        Mock::given(method("POST"))
            .and(path(op_path))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(op_path))
            .and(body_json(json!({"operationName": "ops/1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ops/1", "done": false})))
            .mount(&server)
            .await;

        let op = vertex(&server)
            .fetch_predict_operation("veo-3.0-generate-001", "ops/1")
            .await
            .unwrap();
        assert_eq!(op["done"], false);
    }

    #[tokio::test]
    async fn ai_studio_uses_api_key_and_get_for_operations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models/veo-3.0-generate-001/operations/abc"))
            .and(header("x-goog-api-key", "key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "x", "done": true})))
            .expect(1)
            .mount(&server)
            .await;

        let t = VertexTransport::ai_studio(
            reqwest::Client::new(),
            format!("{}/v1beta", server.uri()),
            SecretString::from("key-123"),
        );
        let op = t
            .fetch_predict_operation("veo-3.0-generate-001", "models/veo-3.0-generate-001/operations/abc")
            .await
            .unwrap();
        assert_eq!(op["done"], true);
    }
}
