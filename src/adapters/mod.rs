//! Provider adapters.
//!
//! Each provider returns its own JSON shape. Adapters build minimal request bodies and
//! turn responses into the normalized `MediaPart` list, so nothing past this layer
//! reads provider-specific fields.

use crate::error::GenMediaError;
use crate::logs::LogSink;
use crate::media::MediaPart;
use crate::operation::ContentFilter;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde_json::Value;

pub mod gemini;
pub mod imagen;
pub mod lyria;
pub mod veo;

/// Which adapter understands a result body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gemini,
    Imagen,
    Veo,
    Lyria,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Imagen => "imagen",
            Self::Veo => "veo",
            Self::Lyria => "lyria",
        }
    }
}

/// A provider response body tagged with the adapter that reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub provider: Provider,
    pub body: Value,
}

impl RawResult {
    pub fn new(provider: Provider, body: Value) -> Self {
        Self { provider, body }
    }

    /// Content-safety filtering reported by the body, if any item was filtered.
    pub fn content_filter(&self) -> Option<ContentFilter> {
        match self.provider {
            Provider::Gemini => gemini::content_filter(&self.body),
            Provider::Imagen => imagen::content_filter(&self.body),
            Provider::Veo => veo::content_filter(&self.body),
            Provider::Lyria => None,
        }
    }

    /// Normalized parts in response order. Unrecognized items are logged and skipped.
    pub fn parts(&self, log: &dyn LogSink) -> Vec<MediaPart> {
        match self.provider {
            Provider::Gemini => gemini::parts(&self.body, log),
            Provider::Imagen => imagen::parts(&self.body, log),
            Provider::Veo => veo::parts(&self.body, log),
            Provider::Lyria => lyria::parts(&self.body, log),
        }
    }
}

/// First present field among camelCase / snake_case spellings.
pub(crate) fn field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|n| value.get(*n).filter(|v| !v.is_null()))
}

pub(crate) fn str_field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a str> {
    field(value, names)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

pub(crate) fn decode_base64(data: &str) -> Result<Bytes, GenMediaError> {
    BASE64
        .decode(data.trim())
        .map(Bytes::from)
        .map_err(|e| GenMediaError::ParseError(format!("Invalid base64 payload: {e}")))
}

/// A media reference that is either a storage URI or a downloadable handle.
pub(crate) fn uri_part(uri: &str, mime: Option<&str>) -> MediaPart {
    if uri.starts_with("gs://") {
        MediaPart::remote(uri, mime)
    } else {
        MediaPart::FileHandle {
            handle: uri.to_string(),
            mime: mime.map(str::to_string),
        }
    }
}

/// `rai*FilteredCount` / `rai*FilteredReasons` in either spelling.
pub(crate) fn rai_filter(
    value: &Value,
    count_names: &[&str],
    reason_names: &[&str],
) -> Option<ContentFilter> {
    let count = field(value, count_names).and_then(|v| v.as_u64())?;
    if count == 0 {
        return None;
    }
    let reasons = field(value, reason_names)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|r| r.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Some(ContentFilter {
        filtered_count: u32::try_from(count).unwrap_or(u32::MAX),
        reasons,
    })
}

/// Merge caller-supplied parameters into a JSON object without replacing set keys.
pub(crate) fn merge_missing(target: &mut serde_json::Map<String, Value>, extra: &serde_json::Map<String, Value>) {
    for (k, v) in extra {
        target.entry(k.clone()).or_insert_with(|| v.clone());
    }
}
