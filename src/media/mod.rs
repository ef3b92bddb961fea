//! Media parts and extraction.
//!
//! Provider adapters turn responses into `MediaPart`s; `extract::ResponsePartExtractor`
//! turns those into bytes with a resolved MIME type, ready to persist.

use bytes::Bytes;

pub mod extract;
pub mod input;
pub mod mime;
pub mod naming;

pub use extract::{ExtractedMedia, ExtractedResponse, ResponsePartExtractor};
pub use input::{InputPolicy, MediaInput, PreparedMedia, prepare_inputs};
pub use naming::artifact_filename;

/// Broad media category, used for artifact prefixes and output slot names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn from_mime(mime: &str) -> Option<Self> {
        let m = mime::normalize(mime);
        if m.starts_with("image/") {
            Some(Self::Image)
        } else if m.starts_with("video/") {
            Some(Self::Video)
        } else if m.starts_with("audio/") {
            Some(Self::Audio)
        } else {
            None
        }
    }

    /// Lowercase name used in grid slot names (`image_1_2`).
    pub fn slot_prefix(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Fallback MIME when neither the response nor the bytes tell us.
    pub fn default_mime(&self) -> &'static str {
        match self {
            Self::Image => "image/png",
            Self::Video => "video/mp4",
            Self::Audio => "audio/wav",
        }
    }
}

/// One normalized piece of a provider response.
///
/// `mime` is whatever the response declared; the extractor resolves the final type.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaPart {
    Text(String),
    InlineMedia { bytes: Bytes, mime: Option<String> },
    /// `scheme://bucket/path`, fetched through a storage downloader.
    RemoteMedia { uri: String, mime: Option<String> },
    /// Provider-side file reference, downloaded to a local temp file then read.
    FileHandle { handle: String, mime: Option<String> },
}

impl MediaPart {
    pub fn inline(bytes: impl Into<Bytes>, mime: Option<&str>) -> Self {
        Self::InlineMedia {
            bytes: bytes.into(),
            mime: mime.map(str::to_string),
        }
    }

    pub fn remote(uri: impl Into<String>, mime: Option<&str>) -> Self {
        Self::RemoteMedia {
            uri: uri.into(),
            mime: mime.map(str::to_string),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    pub fn declared_mime(&self) -> Option<&str> {
        match self {
            Self::Text(_) => None,
            Self::InlineMedia { mime, .. }
            | Self::RemoteMedia { mime, .. }
            | Self::FileHandle { mime, .. } => mime.as_deref(),
        }
    }
}
