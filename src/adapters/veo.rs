//! Veo `predictLongRunning` / `fetchPredictOperation`.
//!
//! The finished operation's `response` carries `videos[]` (Vertex) or
//! `generatedSamples[].video` (Gemini API), plus `raiMediaFilteredCount` and
//! `raiMediaFilteredReasons` when the safety filter removed videos.

use super::{decode_base64, field, merge_missing, rai_filter, str_field, uri_part};
use crate::logs::LogSink;
use crate::media::{MediaPart, PreparedMedia};
use crate::operation::ContentFilter;
use crate::request::GenerationRequest;
use serde_json::{Map, Value, json};

/// Most reference images a request may carry.
pub const MAX_REFERENCE_IMAGES: usize = 3;

/// How reference images steer a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceType {
    /// Subjects or objects to keep in the video (up to three images).
    #[default]
    Asset,
    /// Overall look of the video (one image).
    Style,
}

impl ReferenceType {
    /// Unknown values fall back to `Asset`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "style" => Self::Style,
            _ => Self::Asset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Style => "style",
        }
    }

    pub fn max_images(&self) -> usize {
        match self {
            Self::Asset => MAX_REFERENCE_IMAGES,
            Self::Style => 1,
        }
    }
}

fn image_json(input: &PreparedMedia) -> Value {
    json!({ "bytesBase64Encoded": input.base64(), "mimeType": input.mime })
}

/// Request body. Without a reference type the first input is the start frame; with one,
/// inputs become `referenceImages` (trimmed to what the type allows, with a warning).
pub fn build_request(req: &GenerationRequest, log: &dyn LogSink) -> Value {
    let mut extra = req.extra_params.clone();

    let mut instance = Map::new();
    instance.insert("prompt".into(), json!(req.prompt));
    // Caller-supplied instance objects win over the input list.
    for key in ["image", "lastFrame", "video", "referenceImages"] {
        if let Some(v) = extra.remove(key) {
            instance.insert(key.into(), v);
        }
    }
    match req.reference_type {
        Some(kind) if !instance.contains_key("referenceImages") && !req.inputs.is_empty() => {
            let max = kind.max_images();
            if req.inputs.len() > max {
                log.warn(&format!(
                    "⚠️ Warning: '{}' references support {max} image(s); ignoring {} extra input(s).",
                    kind.as_str(),
                    req.inputs.len() - max
                ));
            }
            let refs: Vec<Value> = req
                .inputs
                .iter()
                .take(max)
                .map(|input| json!({ "image": image_json(input), "referenceType": kind.as_str() }))
                .collect();
            log.info(&format!(
                "🖼️ Sending {} reference image(s) with type '{}'",
                refs.len(),
                kind.as_str()
            ));
            instance.insert("referenceImages".into(), Value::Array(refs));
        }
        None if !instance.contains_key("image") => {
            if let Some(first) = req.inputs.first() {
                instance.insert("image".into(), image_json(first));
            }
            if req.inputs.len() > 1 {
                log.warn(&format!(
                    "⚠️ Only the first input is used as the start frame; ignoring {} more. Set a reference type to send them as reference images.",
                    req.inputs.len() - 1
                ));
            }
        }
        _ => {}
    }

    let mut parameters = Map::new();
    parameters.insert("sampleCount".into(), json!(req.sample_count.unwrap_or(1)));
    if let Some(ar) = &req.aspect_ratio {
        parameters.insert("aspectRatio".into(), json!(ar));
    }
    if let Some(neg) = &req.negative_prompt {
        parameters.insert("negativePrompt".into(), json!(neg));
    }
    if let Some(seed) = req.seed {
        parameters.insert("seed".into(), json!(seed));
    }
    merge_missing(&mut parameters, &extra);

    json!({
        "instances": [Value::Object(instance)],
        "parameters": parameters,
    })
}

/// Body of the operation response; Gemini API nests it under `generateVideoResponse`.
fn response_root(body: &Value) -> &Value {
    field(body, &["generateVideoResponse", "generate_video_response"]).unwrap_or(body)
}

pub fn content_filter(body: &Value) -> Option<ContentFilter> {
    rai_filter(
        response_root(body),
        &["raiMediaFilteredCount", "rai_media_filtered_count"],
        &["raiMediaFilteredReasons", "rai_media_filtered_reasons"],
    )
}

fn videos(body: &Value) -> Vec<&Value> {
    let root = response_root(body);
    if let Some(list) = field(root, &["videos"]).and_then(|v| v.as_array()) {
        return list.iter().collect();
    }
    field(root, &["generatedSamples", "generated_samples", "generatedVideos", "generated_videos"])
        .and_then(|v| v.as_array())
        .map(|samples| {
            samples
                .iter()
                .map(|s| field(s, &["video"]).unwrap_or(s))
                .collect()
        })
        .unwrap_or_default()
}

pub fn parts(body: &Value, log: &dyn LogSink) -> Vec<MediaPart> {
    let list = videos(body);
    if list.is_empty() {
        log.warn("❌ No videos found in the response.");
        return Vec::new();
    }
    log.info(&format!("🎯 Generated {} video(s)", list.len()));

    let mut out = Vec::with_capacity(list.len());
    for (idx, video) in list.into_iter().enumerate() {
        let n = idx + 1;
        // Undeclared types are left to the download's content type and the bytes.
        let mime = str_field(video, &["mimeType", "mime_type"]);
        if let Some(data) = str_field(
            video,
            &["bytesBase64Encoded", "bytes_base64_encoded", "videoBytes", "video_bytes"],
        ) {
            match decode_base64(data) {
                Ok(bytes) => {
                    log.info(&format!("💾 Video {n} returned as direct bytes."));
                    out.push(MediaPart::inline(bytes, mime));
                }
                Err(e) => log.warn(&format!("❌ Could not retrieve video data for video {n}: {e}")),
            }
        } else if let Some(uri) = str_field(video, &["gcsUri", "gcs_uri", "uri", "videoUri"]) {
            log.info(&format!("📹 Video {n} has URI {uri}"));
            out.push(uri_part(uri, mime));
        } else {
            log.warn(&format!("❌ Could not retrieve video data for video {n}."));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::NodeLog;

    fn image(tag: &str) -> PreparedMedia {
        PreparedMedia {
            name: tag.into(),
            bytes: bytes::Bytes::from(tag.as_bytes().to_vec()),
            mime: "image/png".into(),
        }
    }

    #[test]
    fn first_input_becomes_start_image() {
        let req = GenerationRequest::new("veo-3.0-generate-001", "waves")
            .with_sample_count(2)
            .with_param("durationSeconds", json!(8))
            .with_inputs(vec![PreparedMedia {
                name: "start".into(),
                bytes: bytes::Bytes::from_static(b"hi"),
                mime: "image/jpeg".into(),
            }]);
        let body = build_request(&req, &NodeLog::new());
        assert_eq!(body["instances"][0]["image"]["bytesBase64Encoded"], "aGk=");
        assert_eq!(body["instances"][0]["image"]["mimeType"], "image/jpeg");
        assert_eq!(body["parameters"]["durationSeconds"], 8);
        assert_eq!(body["parameters"]["sampleCount"], 2);
    }

    #[test]
    fn every_asset_input_becomes_a_reference_image() {
        let req = GenerationRequest::new("veo-3.1-generate-preview", "p")
            .with_inputs(vec![image("a"), image("b"), image("c")])
            .with_reference_type(ReferenceType::Asset);
        let log = NodeLog::new();
        let body = build_request(&req, &log);

        let instance = &body["instances"][0];
        assert!(instance.get("image").is_none());
        let refs = instance["referenceImages"].as_array().unwrap();
        assert_eq!(refs.len(), 3);
        for (r, tag) in refs.iter().zip(["a", "b", "c"]) {
            assert_eq!(r["referenceType"], "asset");
            assert_eq!(r["image"]["mimeType"], "image/png");
            assert_eq!(
                r["image"]["bytesBase64Encoded"],
                image(tag).base64().as_str()
            );
        }
        assert_eq!(log.count_containing("⚠️"), 0);
    }

    #[test]
    fn style_reference_keeps_one_image_and_warns() {
        let req = GenerationRequest::new("veo-2.0-generate-exp", "p")
            .with_inputs(vec![image("a"), image("b")])
            .with_reference_type(ReferenceType::Style);
        let log = NodeLog::new();
        let body = build_request(&req, &log);

        let refs = body["instances"][0]["referenceImages"].as_array().unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0]["referenceType"], "style");
        assert_eq!(log.count_containing("ignoring 1 extra input"), 1);
    }

    #[test]
    fn extra_inputs_without_reference_type_are_reported() {
        let req = GenerationRequest::new("veo-3.0-generate-001", "p")
            .with_inputs(vec![image("a"), image("b"), image("c")]);
        let log = NodeLog::new();
        let body = build_request(&req, &log);
        assert!(body["instances"][0].get("referenceImages").is_none());
        assert_eq!(log.count_containing("ignoring 2 more"), 1);
    }

    #[test]
    fn reference_type_parsing() {
        assert_eq!(ReferenceType::parse("Style"), ReferenceType::Style);
        assert_eq!(ReferenceType::parse("asset"), ReferenceType::Asset);
        assert_eq!(ReferenceType::parse("bogus"), ReferenceType::Asset);
    }

    #[test]
    fn vertex_videos_and_gemini_samples() {
        let vertex = json!({"videos": [
            {"gcsUri": "gs://b/0.mp4", "mimeType": "video/mp4"},
            {"bytesBase64Encoded": "aGk="}
        ]});
        let p = parts(&vertex, &NodeLog::new());
        assert_eq!(p.len(), 2);
        assert!(matches!(p[0], MediaPart::RemoteMedia { .. }));
        assert_eq!(p[1], MediaPart::inline(b"hi".to_vec(), None));

        let gemini = json!({"generateVideoResponse": {"generatedSamples": [
            {"video": {"uri": "https://generativelanguage.googleapis.com/v1beta/files/abc:download"}}
        ]}});
        let p = parts(&gemini, &NodeLog::new());
        assert!(matches!(p[0], MediaPart::FileHandle { .. }));
    }

    #[test]
    fn filter_count_and_reasons() {
        let body = json!({
            "raiMediaFilteredCount": 1,
            "raiMediaFilteredReasons": ["Video violates policy"],
            "videos": []
        });
        let f = content_filter(&body).unwrap();
        assert_eq!(f.filtered_count, 1);
        assert_eq!(f.reasons, vec!["Video violates policy"]);
    }
}
