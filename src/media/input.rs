//! Input media (reference images, documents).
//!
//! Each item is validated on its own: a bad item is logged and skipped, the rest of the
//! batch still goes through.

use super::mime;
use crate::error::GenMediaError;
use crate::logs::LogSink;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;

pub const MAX_IMAGE_BYTES: usize = 7 * 1024 * 1024;
pub const MAX_DOC_BYTES: usize = 50 * 1024 * 1024;
/// Inline request payload cap for media understanding.
pub const MAX_INLINE_BYTES: usize = 20 * 1024 * 1024;

/// A caller-supplied media item.
#[derive(Debug, Clone)]
pub enum MediaInput {
    Bytes {
        name: String,
        bytes: Bytes,
        mime: Option<String>,
    },
    /// Fetched over HTTP; the response content-type feeds MIME resolution.
    Url { name: String, url: String },
}

impl MediaInput {
    pub fn name(&self) -> &str {
        match self {
            Self::Bytes { name, .. } | Self::Url { name, .. } => name,
        }
    }
}

/// Allowed MIME types and the size cap for one class of input.
#[derive(Debug, Clone)]
pub struct InputPolicy {
    pub allowed_mimes: Vec<String>,
    pub max_bytes: usize,
}

impl InputPolicy {
    pub fn images() -> Self {
        Self {
            allowed_mimes: ["image/png", "image/jpeg", "image/webp", "image/heic", "image/heif"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_bytes: MAX_IMAGE_BYTES,
        }
    }

    pub fn documents() -> Self {
        Self {
            allowed_mimes: vec!["application/pdf".into(), "text/plain".into()],
            max_bytes: MAX_DOC_BYTES,
        }
    }

    /// Anything Gemini can read inline: images, documents, video and audio.
    pub fn analysis() -> Self {
        let mut allowed_mimes = Self::images().allowed_mimes;
        allowed_mimes.extend(Self::documents().allowed_mimes);
        allowed_mimes.extend(
            [
                "video/mp4",
                "video/webm",
                "video/quicktime",
                "video/mpeg",
                "audio/mpeg",
                "audio/wav",
                "audio/x-wav",
                "audio/ogg",
                "audio/flac",
                "audio/x-flac",
            ]
            .into_iter()
            .map(String::from),
        );
        Self {
            allowed_mimes,
            max_bytes: MAX_INLINE_BYTES,
        }
    }

    pub fn validate(&self, name: &str, bytes: &[u8], mime: &str) -> Result<(), GenMediaError> {
        if !self.allowed_mimes.iter().any(|m| m == mime) {
            return Err(GenMediaError::UnsupportedMediaError(format!(
                "'{name}' has unsupported MIME type: {mime}. Supported: {}",
                self.allowed_mimes.join(", ")
            )));
        }
        if bytes.len() > self.max_bytes {
            return Err(GenMediaError::UnsupportedMediaError(format!(
                "'{name}' is {:.1} MB, which exceeds the {:.0} MB limit",
                bytes.len() as f64 / (1024.0 * 1024.0),
                self.max_bytes as f64 / (1024.0 * 1024.0)
            )));
        }
        Ok(())
    }
}

/// A validated input ready to embed in a request.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedMedia {
    pub name: String,
    pub bytes: Bytes,
    pub mime: String,
}

impl PreparedMedia {
    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

/// Resolve, validate and collect inputs, skipping (and logging) any item that fails.
pub async fn prepare_inputs(
    items: Vec<MediaInput>,
    policy: &InputPolicy,
    http: &reqwest::Client,
    log: &dyn LogSink,
) -> Vec<PreparedMedia> {
    let mut prepared = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let name = item.name().to_string();
        match prepare_one(item, policy, http).await {
            Ok(media) => {
                log.info(&format!(
                    "✅ Input {} '{name}' ready ({} bytes, {})",
                    idx + 1,
                    media.bytes.len(),
                    media.mime
                ));
                prepared.push(media);
            }
            Err(e) => {
                log.warn(&format!("⚠️ Skipping input {} '{name}': {e}", idx + 1));
            }
        }
    }
    prepared
}

async fn prepare_one(
    item: MediaInput,
    policy: &InputPolicy,
    http: &reqwest::Client,
) -> Result<PreparedMedia, GenMediaError> {
    let (name, bytes, mime) = match item {
        MediaInput::Bytes { name, bytes, mime } => {
            let resolved = mime::resolve_mime(mime.as_deref(), None, &bytes);
            (name, bytes, resolved)
        }
        MediaInput::Url { name, url } => {
            let resp = http.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(GenMediaError::api_error(
                    status.as_u16(),
                    format!("Failed to fetch {url}"),
                ));
            }
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = resp.bytes().await?;
            let mut resolved = mime::resolve_mime(None, content_type.as_deref(), &bytes);
            if resolved == mime::OCTET_STREAM
                && let Some(by_name) = mime::mime_from_filename(&url)
            {
                resolved = by_name;
            }
            (name, bytes, resolved)
        }
    };
    policy.validate(&name, &bytes, &mime)?;
    Ok(PreparedMedia { name, bytes, mime })
}
