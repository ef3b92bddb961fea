//! Response part extraction.
//!
//! Resolves every `MediaPart` to bytes in response order: inline payloads as-is, storage
//! URIs through the injected `StorageDownloader`, file handles by downloading to a local
//! temp file, reading it back and deleting it.

use super::mime::{self, OCTET_STREAM};
use super::{MediaKind, MediaPart};
use crate::adapters::RawResult;
use crate::error::GenMediaError;
use crate::logs::LogSink;
use crate::storage::{FileDownloader, StorageDownloader, StorageUri};
use bytes::Bytes;
use std::sync::Arc;

/// One media payload ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMedia {
    pub bytes: Bytes,
    pub mime: String,
}

impl ExtractedMedia {
    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_mime(&self.mime)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedResponse {
    /// Text parts joined with `\n`, if there were any.
    pub text: Option<String>,
    /// Non-text parts, in response order.
    pub media: Vec<ExtractedMedia>,
}

#[derive(Clone, Default)]
pub struct ResponsePartExtractor {
    storage: Option<Arc<dyn StorageDownloader>>,
    files: Option<Arc<dyn FileDownloader>>,
    fallback_kind: Option<MediaKind>,
}

impl ResponsePartExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageDownloader>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_files(mut self, files: Arc<dyn FileDownloader>) -> Self {
        self.files = Some(files);
        self
    }

    /// MIME family assumed when neither the response nor the bytes identify a payload.
    pub fn with_fallback_kind(mut self, kind: MediaKind) -> Self {
        self.fallback_kind = Some(kind);
        self
    }

    /// Normalize a raw provider result. A content-filtered result never reaches extraction.
    pub async fn extract_raw(
        &self,
        raw: &RawResult,
        log: &dyn LogSink,
    ) -> Result<ExtractedResponse, GenMediaError> {
        if let Some(filter) = raw.content_filter() {
            return Err(filter.into_error());
        }
        self.extract(raw.parts(log), log).await
    }

    pub async fn extract(
        &self,
        parts: Vec<MediaPart>,
        log: &dyn LogSink,
    ) -> Result<ExtractedResponse, GenMediaError> {
        let mut texts = Vec::new();
        let mut media = Vec::new();

        for (idx, part) in parts.into_iter().enumerate() {
            let n = idx + 1;
            match part {
                MediaPart::Text(text) => texts.push(text),
                MediaPart::InlineMedia { bytes, mime } => {
                    if bytes.is_empty() {
                        log.warn(&format!("⚠️ Part {n}: empty inline payload, skipping"));
                        continue;
                    }
                    let mime = self.resolve(mime.as_deref(), None, &bytes);
                    log.info(&format!("💾 Part {n}: inline media ({} bytes, {mime})", bytes.len()));
                    media.push(ExtractedMedia { bytes, mime });
                }
                MediaPart::RemoteMedia { uri, mime } => {
                    let Some(storage) = &self.storage else {
                        log.warn(&format!(
                            "⚠️ Part {n}: storage URI {uri} but no storage downloader configured, skipping"
                        ));
                        continue;
                    };
                    log.info(&format!("📥 Part {n}: downloading {uri}"));
                    let parsed = StorageUri::parse(&uri)?;
                    let downloaded = storage.download(&parsed).await?;
                    let mime = self.resolve(
                        mime.as_deref(),
                        downloaded.content_type.as_deref(),
                        &downloaded.bytes,
                    );
                    media.push(ExtractedMedia {
                        bytes: downloaded.bytes,
                        mime,
                    });
                }
                MediaPart::FileHandle { handle, mime } => {
                    let Some(files) = &self.files else {
                        log.warn(&format!(
                            "⚠️ Part {n}: file handle {handle} but no file downloader configured, skipping"
                        ));
                        continue;
                    };
                    log.info(&format!("📥 Part {n}: downloading file {handle}"));
                    let (bytes, content_type) = download_via_temp(files.as_ref(), &handle).await?;
                    let mime = self.resolve(mime.as_deref(), content_type.as_deref(), &bytes);
                    media.push(ExtractedMedia { bytes, mime });
                }
            }
        }

        Ok(ExtractedResponse {
            text: (!texts.is_empty()).then(|| texts.join("\n")),
            media,
        })
    }

    fn resolve(&self, declared: Option<&str>, content_type: Option<&str>, bytes: &[u8]) -> String {
        let resolved = mime::resolve_mime(declared, content_type, bytes);
        match self.fallback_kind {
            Some(kind) if resolved == OCTET_STREAM => kind.default_mime().to_string(),
            _ => resolved,
        }
    }
}

/// Download to a local temp file, read it, then delete it. Cleanup failures are logged only.
async fn download_via_temp(
    files: &dyn FileDownloader,
    handle: &str,
) -> Result<(Bytes, Option<String>), GenMediaError> {
    let temp = tempfile::Builder::new()
        .prefix("genmedia-download-")
        .tempfile()?
        .into_temp_path();
    let content_type = files.download_to(handle, &temp).await?;
    let bytes = tokio::fs::read(&temp).await?;
    if let Err(e) = temp.close() {
        tracing::warn!(error = %e, "failed to remove temporary download");
    }
    Ok((Bytes::from(bytes), content_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::NodeLog;
    use crate::storage::Downloaded;
    use std::path::Path;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

    struct FakeStorage;

    #[async_trait::async_trait]
    impl StorageDownloader for FakeStorage {
        async fn download(&self, uri: &StorageUri) -> Result<Downloaded, GenMediaError> {
            Ok(Downloaded {
                bytes: Bytes::from(format!("bytes-of-{}", uri.object)),
                content_type: Some("video/mp4".into()),
            })
        }
    }

    struct FakeFiles;

    #[async_trait::async_trait]
    impl FileDownloader for FakeFiles {
        async fn download_to(
            &self,
            _handle: &str,
            dest: &Path,
        ) -> Result<Option<String>, GenMediaError> {
            tokio::fs::write(dest, PNG).await?;
            Ok(Some("application/octet-stream".into()))
        }
    }

    #[tokio::test]
    async fn keeps_response_order_and_joins_text() {
        let extractor = ResponsePartExtractor::new()
            .with_storage(Arc::new(FakeStorage))
            .with_files(Arc::new(FakeFiles));
        let parts = vec![
            MediaPart::Text("first".into()),
            MediaPart::remote("gs://b/v.mp4", None),
            MediaPart::inline(PNG.to_vec(), None),
            MediaPart::Text("second".into()),
            MediaPart::FileHandle {
                handle: "https://files.example/abc".into(),
                mime: None,
            },
        ];
        let out = extractor.extract(parts, &NodeLog::new()).await.unwrap();
        assert_eq!(out.text.as_deref(), Some("first\nsecond"));
        let mimes: Vec<_> = out.media.iter().map(|m| m.mime.as_str()).collect();
        assert_eq!(mimes, ["video/mp4", "image/png", "image/png"]);
        assert_eq!(&out.media[0].bytes[..], b"bytes-of-v.mp4");
    }

    #[tokio::test]
    async fn missing_downloader_skips_with_warning() {
        let log = NodeLog::new();
        let out = ResponsePartExtractor::new()
            .extract(vec![MediaPart::remote("gs://b/x.png", None)], &log)
            .await
            .unwrap();
        assert!(out.media.is_empty());
        assert_eq!(log.count_containing("skipping"), 1);
    }

    #[tokio::test]
    async fn fallback_kind_applies_to_unknown_bytes() {
        let out = ResponsePartExtractor::new()
            .with_fallback_kind(MediaKind::Audio)
            .extract(vec![MediaPart::inline(b"raw".to_vec(), None)], &NodeLog::new())
            .await
            .unwrap();
        assert_eq!(out.media[0].mime, "audio/wav");
    }
}
