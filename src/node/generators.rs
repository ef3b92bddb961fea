//! Concrete generator nodes.

use super::{GenerationContext, GeneratorNode, NodeParameters};
use crate::adapters::veo::ReferenceType;
use crate::adapters::{Provider, RawResult, gemini, imagen, lyria, veo};
use crate::error::GenMediaError;
use crate::media::{InputPolicy, MediaKind, PreparedMedia};
use crate::operation::Operation;
use crate::request::GenerationRequest;
use serde_json::{Value, json};

const MAX_IMAGES: u64 = 4;
const MAX_VIDEOS: u64 = 4;

fn base_request(
    params: &NodeParameters,
    default_model: &str,
) -> Result<GenerationRequest, GenMediaError> {
    let prompt = params.require_str("prompt")?;
    let model = params.str("model").unwrap_or(default_model);
    let mut req = GenerationRequest::new(model, prompt);
    if let Some(neg) = params.str("negative_prompt") {
        req = req.with_negative_prompt(neg);
    }
    if let Some(ar) = params.str("aspect_ratio") {
        req = req.with_aspect_ratio(ar);
    }
    Ok(req)
}

/// Copy optional parameters into the provider request under their wire names.
fn copy_params(
    mut req: GenerationRequest,
    params: &NodeParameters,
    mapping: &[(&str, &str)],
) -> GenerationRequest {
    for (param, wire) in mapping {
        if let Some(v) = params.get(param) {
            let blank = v.as_str().is_some_and(|s| s.trim().is_empty());
            if !blank {
                req = req.with_param(*wire, v.clone());
            }
        }
    }
    req
}

/// Gemini image generation and editing (`generateContent`, text + image out).
#[derive(Debug, Clone, Default)]
pub struct GeminiImageNode;

impl GeminiImageNode {
    pub const DEFAULT_MODEL: &'static str = "gemini-2.5-flash-image";
}

#[async_trait::async_trait]
impl GeneratorNode for GeminiImageNode {
    fn name(&self) -> &'static str {
        "Gemini Image Generator"
    }

    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Image
    }

    fn artifact_prefix(&self) -> &'static str {
        "gemini_image"
    }

    fn default_location(&self) -> Option<&'static str> {
        Some("global")
    }

    fn build_request(
        &self,
        params: &NodeParameters,
        inputs: Vec<PreparedMedia>,
    ) -> Result<GenerationRequest, GenMediaError> {
        let mut req = base_request(params, Self::DEFAULT_MODEL)?
            .with_temperature(params.f64("temperature").unwrap_or(1.0))
            .with_inputs(inputs);
        if let Some(n) = params.u64("candidate_count") {
            req = req.with_sample_count(n.clamp(1, MAX_IMAGES) as u32);
        }
        if let Some(seed) = params.u64("seed") {
            req = req.with_seed(seed);
        }
        req = req.with_param("topP", json!(params.f64("top_p").unwrap_or(0.95)));
        Ok(req)
    }

    async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        request: &GenerationRequest,
    ) -> Result<RawResult, GenMediaError> {
        if !request.inputs.is_empty() {
            ctx.log.info(&format!(
                "🖼️ Sending {} reference image(s)",
                request.inputs.len()
            ));
        }
        let body = gemini::build_request(request);
        let response = ctx.transport.generate_content(&request.model, &body).await?;
        Ok(RawResult::new(self.provider(), response))
    }
}

/// Gemini media understanding: images, video, audio and documents in, text out.
#[derive(Debug, Clone, Default)]
pub struct GeminiAnalyzeMediaNode;

impl GeminiAnalyzeMediaNode {
    pub const DEFAULT_MODEL: &'static str = "gemini-2.5-flash";
    pub const DEFAULT_PROMPT: &'static str =
        "Please analyze and describe all the provided media content in detail.";
    const DEFAULT_TEMPERATURE: f64 = 0.4;
    const DEFAULT_MAX_TOKENS: u64 = 2048;
}

#[async_trait::async_trait]
impl GeneratorNode for GeminiAnalyzeMediaNode {
    fn name(&self) -> &'static str {
        "Gemini Media Analyzer"
    }

    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    /// Analysis returns text; the kind only matters if the model answers with media.
    fn media_kind(&self) -> MediaKind {
        MediaKind::Image
    }

    fn artifact_prefix(&self) -> &'static str {
        "gemini_analysis"
    }

    fn input_policy(&self) -> InputPolicy {
        InputPolicy::analysis()
    }

    fn build_request(
        &self,
        params: &NodeParameters,
        inputs: Vec<PreparedMedia>,
    ) -> Result<GenerationRequest, GenMediaError> {
        if inputs.is_empty() {
            return Err(GenMediaError::InvalidParameter(
                "At least one media input is required".to_string(),
            ));
        }
        let prompt = params.str("prompt").unwrap_or(Self::DEFAULT_PROMPT);
        let model = params.str("model").unwrap_or(Self::DEFAULT_MODEL);
        let max_tokens = params.u64("max_tokens").unwrap_or(Self::DEFAULT_MAX_TOKENS);
        Ok(GenerationRequest::new(model, prompt)
            .with_temperature(
                params
                    .f64("temperature")
                    .unwrap_or(Self::DEFAULT_TEMPERATURE)
                    .clamp(0.0, 2.0),
            )
            .with_param("maxOutputTokens", json!(max_tokens))
            .with_param("responseModalities", json!(["TEXT"]))
            .with_inputs(inputs))
    }

    async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        request: &GenerationRequest,
    ) -> Result<RawResult, GenMediaError> {
        ctx.log.info(&format!(
            "🤖 Analyzing {} media item(s) with Gemini model: {}",
            request.inputs.len(),
            request.model
        ));
        let body = gemini::build_request(request);
        let response = ctx.transport.generate_content(&request.model, &body).await?;
        if gemini::content_filter(&response).is_none() && !gemini::has_text(&response) {
            return Err(GenMediaError::ParseError(
                "No response generated from Gemini model".to_string(),
            ));
        }
        Ok(RawResult::new(self.provider(), response))
    }
}

/// Imagen text-to-image (`predict`).
#[derive(Debug, Clone, Default)]
pub struct ImagenNode;

impl ImagenNode {
    pub const DEFAULT_MODEL: &'static str = "imagen-3.0-generate-002";
}

#[async_trait::async_trait]
impl GeneratorNode for ImagenNode {
    fn name(&self) -> &'static str {
        "Imagen Image Generator"
    }

    fn provider(&self) -> Provider {
        Provider::Imagen
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Image
    }

    fn artifact_prefix(&self) -> &'static str {
        "imagen_image"
    }

    fn build_request(
        &self,
        params: &NodeParameters,
        _inputs: Vec<PreparedMedia>,
    ) -> Result<GenerationRequest, GenMediaError> {
        let mut req = base_request(params, Self::DEFAULT_MODEL)?.with_sample_count(
            params
                .u64("number_of_images")
                .unwrap_or(1)
                .clamp(1, MAX_IMAGES) as u32,
        );
        if req.aspect_ratio.is_none() {
            req = req.with_aspect_ratio("1:1");
        }
        if let Some(seed) = params.u64("seed") {
            // The API rejects a seed while watermarking is on.
            req = req.with_seed(seed).with_param("addWatermark", json!(false));
        }
        if let Some(mime) = params.str("output_mime_type") {
            req = req.with_param("outputOptions", json!({ "mimeType": mime }));
        }
        Ok(copy_params(
            req,
            params,
            &[
                ("enhance_prompt", "enhancePrompt"),
                ("language", "language"),
                ("add_watermark", "addWatermark"),
                ("safety_filter_level", "safetySetting"),
                ("person_generation", "personGeneration"),
            ],
        ))
    }

    async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        request: &GenerationRequest,
    ) -> Result<RawResult, GenMediaError> {
        let body = imagen::build_request(request);
        let response = ctx.transport.predict(&request.model, &body).await?;
        Ok(RawResult::new(self.provider(), response))
    }
}

/// Veo text/image-to-video (`predictLongRunning`, polled to completion).
///
/// The first input is the start frame. With `reference_type` set (`asset` or `style`)
/// inputs are sent as reference images instead.
#[derive(Debug, Clone, Default)]
pub struct VeoVideoNode;

impl VeoVideoNode {
    pub const DEFAULT_MODEL: &'static str = "veo-3.0-generate-001";
}

#[async_trait::async_trait]
impl GeneratorNode for VeoVideoNode {
    fn name(&self) -> &'static str {
        "Veo Video Generator"
    }

    fn provider(&self) -> Provider {
        Provider::Veo
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn artifact_prefix(&self) -> &'static str {
        "veo_video"
    }

    fn build_request(
        &self,
        params: &NodeParameters,
        inputs: Vec<PreparedMedia>,
    ) -> Result<GenerationRequest, GenMediaError> {
        let mut req = base_request(params, Self::DEFAULT_MODEL)?
            .with_sample_count(
                params
                    .u64("number_of_videos")
                    .unwrap_or(1)
                    .clamp(1, MAX_VIDEOS) as u32,
            )
            .with_inputs(inputs);
        if req.aspect_ratio.is_none() {
            req = req.with_aspect_ratio("16:9");
        }
        if let Some(seed) = params.u64("seed") {
            req = req.with_seed(seed);
        }
        if let Some(duration) = params.u64("duration_seconds") {
            req = req.with_param("durationSeconds", json!(duration));
        }
        if let Some(kind) = params.str("reference_type") {
            req = req.with_reference_type(ReferenceType::parse(kind));
        }
        Ok(copy_params(
            req,
            params,
            &[
                ("generate_audio", "generateAudio"),
                ("resolution", "resolution"),
                ("person_generation", "personGeneration"),
                ("storage_uri", "storageUri"),
            ],
        ))
    }

    async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        request: &GenerationRequest,
    ) -> Result<RawResult, GenMediaError> {
        let transport = ctx.transport;
        let model = request.model.as_str();
        let body = veo::build_request(request, ctx.log);
        let provider = self.provider();

        let report = ctx
            .poller
            .run(
                move || async move {
                    let value = transport.predict_long_running(model, &body).await?;
                    Operation::from_json(provider, &value)
                },
                move |op: Operation| async move {
                    let value = transport.fetch_predict_operation(model, &op.name).await?;
                    Operation::from_json(provider, &value)
                },
                ctx.log,
            )
            .await?;
        tracing::debug!(
            operation = %report.operation_name,
            polls = report.polls,
            heartbeats = report.heartbeats,
            "video operation finished"
        );
        report.into_result()
    }
}

/// Lyria text-to-music (`predict`).
#[derive(Debug, Clone, Default)]
pub struct LyriaAudioNode;

impl LyriaAudioNode {
    pub const DEFAULT_MODEL: &'static str = "lyria-002";
}

#[async_trait::async_trait]
impl GeneratorNode for LyriaAudioNode {
    fn name(&self) -> &'static str {
        "Lyria Audio Generator"
    }

    fn provider(&self) -> Provider {
        Provider::Lyria
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn artifact_prefix(&self) -> &'static str {
        "lyria_audio"
    }

    fn build_request(
        &self,
        params: &NodeParameters,
        _inputs: Vec<PreparedMedia>,
    ) -> Result<GenerationRequest, GenMediaError> {
        let mut req = base_request(params, Self::DEFAULT_MODEL)?;
        if params.bool("use_seed").unwrap_or(false)
            && let Some(seed) = params.u64("seed")
        {
            req = req.with_seed(seed);
        }
        Ok(req)
    }

    async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        request: &GenerationRequest,
    ) -> Result<RawResult, GenMediaError> {
        let body = lyria::build_request(request);
        let response = ctx.transport.predict(&request.model, &body).await?;
        if response.get("predictions").is_none_or(Value::is_null) {
            ctx.log.warn("⚠️ Response has no 'predictions' field");
        }
        Ok(RawResult::new(self.provider(), response))
    }
}
