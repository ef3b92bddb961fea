//! Gemini `generateContent`.
//!
//! Parts come from `candidates[0].content.parts`, or a top-level `parts` array.
//! Thought parts (model reasoning) are skipped.

use super::{decode_base64, field, merge_missing, str_field, uri_part};
use crate::logs::LogSink;
use crate::media::MediaPart;
use crate::operation::ContentFilter;
use crate::request::GenerationRequest;
use serde_json::{Map, Value, json};

const SAFETY_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
];

pub fn build_request(req: &GenerationRequest) -> Value {
    let mut parts = vec![json!({ "text": req.prompt })];
    for input in &req.inputs {
        parts.push(json!({
            "inlineData": { "mimeType": input.mime, "data": input.base64() }
        }));
    }

    let mut generation_config = Map::new();
    if let Some(t) = req.temperature {
        generation_config.insert("temperature".into(), json!(t));
    }
    if let Some(seed) = req.seed {
        generation_config.insert("seed".into(), json!(seed));
    }
    if let Some(n) = req.sample_count {
        generation_config.insert("candidateCount".into(), json!(n));
    }
    if let Some(ar) = &req.aspect_ratio {
        generation_config.insert("imageConfig".into(), json!({ "aspectRatio": ar }));
    }
    merge_missing(&mut generation_config, &req.extra_params);
    generation_config
        .entry("responseModalities")
        .or_insert_with(|| json!(["TEXT", "IMAGE"]));

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": generation_config,
    })
}

fn response_parts(body: &Value) -> Option<&Vec<Value>> {
    body.pointer("/candidates/0/content/parts")
        .and_then(|v| v.as_array())
        .or_else(|| body.get("parts").and_then(|v| v.as_array()))
}

/// Whether any non-thought part carries text.
pub fn has_text(body: &Value) -> bool {
    response_parts(body).is_some_and(|parts| {
        parts.iter().any(|p| {
            p.get("thought").and_then(|v| v.as_bool()) != Some(true)
                && p.get("text")
                    .and_then(|v| v.as_str())
                    .is_some_and(|t| !t.trim().is_empty())
        })
    })
}

/// A blocked prompt, or a safety stop that produced no content.
pub fn content_filter(body: &Value) -> Option<ContentFilter> {
    if let Some(feedback) = field(body, &["promptFeedback", "prompt_feedback"])
        && let Some(reason) = str_field(feedback, &["blockReason", "block_reason"])
    {
        let mut text = reason.to_string();
        if let Some(msg) = str_field(feedback, &["blockReasonMessage", "block_reason_message"]) {
            text = format!("{text}: {msg}");
        }
        return Some(ContentFilter {
            filtered_count: 1,
            reasons: vec![text],
        });
    }
    let has_parts = response_parts(body).is_some_and(|p| !p.is_empty());
    if !has_parts
        && let Some(candidate) = body.pointer("/candidates/0")
        && let Some(reason) = str_field(candidate, &["finishReason", "finish_reason"])
        && SAFETY_FINISH_REASONS.contains(&reason)
    {
        let mut text = reason.to_string();
        if let Some(msg) = str_field(candidate, &["finishMessage", "finish_message"]) {
            text = format!("{text}: {msg}");
        }
        return Some(ContentFilter {
            filtered_count: 1,
            reasons: vec![text],
        });
    }
    None
}

pub fn parts(body: &Value, log: &dyn LogSink) -> Vec<MediaPart> {
    let Some(raw_parts) = response_parts(body) else {
        log.warn("⚠️ Response contained no content parts");
        return Vec::new();
    };

    let mut out = Vec::with_capacity(raw_parts.len());
    for (idx, part) in raw_parts.iter().enumerate() {
        let n = idx + 1;
        if part.get("thought").and_then(|v| v.as_bool()) == Some(true) {
            log.info(&format!("💭 Part {n}: thought (skipping)"));
            continue;
        }
        if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
            log.info(&format!("📝 Part {n}: Text ({} chars)", text.chars().count()));
            out.push(MediaPart::Text(text.to_string()));
        } else if let Some(blob) = field(part, &["inlineData", "inline_data"]) {
            let mime = str_field(blob, &["mimeType", "mime_type"]);
            match str_field(blob, &["data"]).map(decode_base64) {
                Some(Ok(bytes)) => out.push(MediaPart::inline(bytes, mime)),
                Some(Err(e)) => log.warn(&format!("⚠️ Part {n}: {e} (skipping)")),
                None => log.warn(&format!("⚠️ Part {n}: inline data without payload (skipping)")),
            }
        } else if let Some(file) = field(part, &["fileData", "file_data"]) {
            let mime = str_field(file, &["mimeType", "mime_type"]);
            match str_field(file, &["fileUri", "file_uri"]) {
                Some(uri) => out.push(uri_part(uri, mime)),
                None => log.warn(&format!("⚠️ Part {n}: file data without URI (skipping)")),
            }
        } else {
            log.warn(&format!("ℹ️ Part {n}: Unknown type (skipping)"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::NodeLog;
    use crate::media::PreparedMedia;

    #[test]
    fn request_carries_prompt_inputs_and_config() {
        let req = GenerationRequest::new("gemini-2.5-flash-image", "a cat")
            .with_temperature(0.5)
            .with_aspect_ratio("16:9")
            .with_inputs(vec![PreparedMedia {
                name: "ref".into(),
                bytes: bytes::Bytes::from_static(b"hi"),
                mime: "image/png".into(),
            }]);
        let body = build_request(&req);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "a cat");
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["data"], "aGk=");
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "16:9");
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
        assert_eq!(body["generationConfig"]["responseModalities"], json!(["TEXT", "IMAGE"]));
    }

    #[test]
    fn text_detection_ignores_thoughts() {
        let thought_only = json!({"candidates": [{"content": {"parts": [
            {"text": "hmm", "thought": true}
        ]}}]});
        assert!(!has_text(&thought_only));
        let answer = json!({"candidates": [{"content": {"parts": [
            {"text": "hmm", "thought": true},
            {"text": "A red fox."}
        ]}}]});
        assert!(has_text(&answer));
    }

    #[test]
    fn parses_text_image_and_skips_thoughts() {
        let body = json!({
            "candidates": [{"content": {"parts": [
                {"text": "thinking...", "thought": true},
                {"text": "Here you go"},
                {"inlineData": {"mimeType": "image/png", "data": "aGk="}},
                {"fileData": {"mimeType": "video/mp4", "fileUri": "gs://b/v.mp4"}},
                {"executableCode": {"code": "print(1)"}}
            ]}}]
        });
        let log = NodeLog::new();
        let parts = parts(&body, &log);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], MediaPart::Text("Here you go".into()));
        assert_eq!(parts[1], MediaPart::inline(b"hi".to_vec(), Some("image/png")));
        assert!(matches!(parts[2], MediaPart::RemoteMedia { .. }));
        assert_eq!(log.count_containing("Unknown type"), 1);
    }

    #[test]
    fn top_level_parts_are_accepted() {
        let body = json!({"parts": [{"text": "a"}]});
        assert_eq!(parts(&body, &NodeLog::new()).len(), 1);
    }

    #[test]
    fn blocked_prompt_is_filtered() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let f = content_filter(&body).unwrap();
        assert_eq!(f.reasons, vec!["SAFETY"]);

        let ok = json!({"candidates": [{"content": {"parts": [{"text": "x"}]}, "finishReason": "STOP"}]});
        assert!(content_filter(&ok).is_none());
    }
}
