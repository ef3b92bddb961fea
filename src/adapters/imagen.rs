//! Imagen `predict`.

use super::{decode_base64, merge_missing, str_field, uri_part};
use crate::logs::LogSink;
use crate::media::MediaPart;
use crate::operation::ContentFilter;
use crate::request::GenerationRequest;
use serde_json::{Map, Value, json};

pub fn build_request(req: &GenerationRequest) -> Value {
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
    merge_missing(&mut parameters, &req.extra_params);

    json!({
        "instances": [{ "prompt": req.prompt }],
        "parameters": parameters,
    })
}

fn predictions(body: &Value) -> &[Value] {
    body.get("predictions")
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn has_image(prediction: &Value) -> bool {
    str_field(prediction, &["bytesBase64Encoded", "bytes_base64_encoded", "gcsUri", "gcs_uri"])
        .is_some()
}

/// Filtered when predictions carry `raiFilteredReason` and none carries an image.
pub fn content_filter(body: &Value) -> Option<ContentFilter> {
    let preds = predictions(body);
    if preds.iter().any(has_image) {
        return None;
    }
    let reasons: Vec<String> = preds
        .iter()
        .filter_map(|p| str_field(p, &["raiFilteredReason", "rai_filtered_reason"]))
        .map(str::to_string)
        .collect();
    if reasons.is_empty() {
        return None;
    }
    Some(ContentFilter {
        filtered_count: u32::try_from(reasons.len()).unwrap_or(u32::MAX),
        reasons,
    })
}

pub fn parts(body: &Value, log: &dyn LogSink) -> Vec<MediaPart> {
    let preds = predictions(body);
    if preds.is_empty() {
        log.warn("❌ No predictions found in response.");
    }
    let mut out = Vec::with_capacity(preds.len());
    for (idx, pred) in preds.iter().enumerate() {
        let n = idx + 1;
        let mime = str_field(pred, &["mimeType", "mime_type"]);
        if let Some(data) = str_field(pred, &["bytesBase64Encoded", "bytes_base64_encoded"]) {
            match decode_base64(data) {
                Ok(bytes) => out.push(MediaPart::inline(bytes, mime)),
                Err(e) => log.warn(&format!("⚠️ Image {n}: {e} (skipping)")),
            }
        } else if let Some(uri) = str_field(pred, &["gcsUri", "gcs_uri"]) {
            out.push(uri_part(uri, mime));
        } else if let Some(reason) = str_field(pred, &["raiFilteredReason", "rai_filtered_reason"]) {
            log.warn(&format!("🚫 Image {n} filtered: {reason}"));
        } else {
            log.warn(&format!("ℹ️ Image {n}: Unknown prediction shape (skipping)"));
        }
    }
    out
}
