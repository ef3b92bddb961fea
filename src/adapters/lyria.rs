//! Lyria `predict`.
//!
//! The audio payload has shipped under several field names; the known ones are tried
//! in order, then any long string value, then a bare base64 string prediction.

use super::{decode_base64, str_field};
use crate::logs::LogSink;
use crate::media::MediaPart;
use crate::request::GenerationRequest;
use serde_json::{Map, Value, json};

const AUDIO_FIELDS: &[&str] = &[
    "bytesBase64Encoded",
    "audioContent",
    "audio_content",
    "content",
    "data",
    "audio",
    "prediction",
];
/// Shorter strings are metadata, not audio.
const MIN_UNNAMED_PAYLOAD_LEN: usize = 1000;
const DEFAULT_AUDIO_MIME: &str = "audio/wav";

/// The endpoint only accepts one sample per request.
pub fn build_request(req: &GenerationRequest) -> Value {
    let mut instance = Map::new();
    instance.insert("prompt".into(), json!(req.prompt));
    if let Some(neg) = &req.negative_prompt {
        instance.insert("negative_prompt".into(), json!(neg));
    }
    if let Some(seed) = req.seed {
        instance.insert("seed".into(), json!(seed));
    }
    json!({
        "instances": [Value::Object(instance)],
        "parameters": { "sample_count": 1 },
    })
}

fn audio_payload(prediction: &Value) -> Option<(&str, &str)> {
    if let Some(s) = prediction.as_str() {
        return Some(("direct_string", s));
    }
    let obj = prediction.as_object()?;
    for name in AUDIO_FIELDS {
        if let Some(s) = obj.get(*name).and_then(|v| v.as_str()).filter(|s| !s.is_empty()) {
            return Some((name, s));
        }
    }
    obj.iter().find_map(|(k, v)| {
        v.as_str()
            .filter(|s| s.len() > MIN_UNNAMED_PAYLOAD_LEN)
            .map(|s| (k.as_str(), s))
    })
}

pub fn parts(body: &Value, log: &dyn LogSink) -> Vec<MediaPart> {
    let preds = body
        .get("predictions")
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();
    if preds.is_empty() {
        log.warn("❌ No predictions found in response.");
        return Vec::new();
    }
    log.info(&format!("🎯 Generated {} audio clip(s)", preds.len()));

    let mut out = Vec::with_capacity(preds.len());
    for (idx, pred) in preds.iter().enumerate() {
        let n = idx + 1;
        let Some((found_in, data)) = audio_payload(pred) else {
            log.warn(&format!("❌ Audio {n}: No audio content found in any expected field"));
            continue;
        };
        match decode_base64(data) {
            Ok(bytes) => {
                log.info(&format!(
                    "✅ Audio {n}: decoded {} bytes from field {found_in}",
                    bytes.len()
                ));
                let mime = str_field(pred, &["mimeType", "mime_type"]).or(Some(DEFAULT_AUDIO_MIME));
                out.push(MediaPart::inline(bytes, mime));
            }
            Err(e) => log.warn(&format!("❌ Audio {n}: failed to decode audio data: {e}")),
        }
    }
    out
}
