//! Storage download capabilities.
//!
//! The extractor never talks to a storage service directly; it is handed a
//! `StorageDownloader` for `scheme://bucket/path` URIs and a `FileDownloader` for
//! provider file handles.

use crate::error::GenMediaError;
use bytes::Bytes;
use std::path::Path;

pub mod files;
pub mod gcs;
pub mod pool;

pub use files::HttpFileDownloader;
pub use gcs::GcsDownloader;
pub use pool::StorageClientPool;

/// A parsed `scheme://bucket/path` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUri {
    pub scheme: String,
    pub bucket: String,
    pub object: String,
}

impl StorageUri {
    pub fn parse(uri: &str) -> Result<Self, GenMediaError> {
        let invalid = || GenMediaError::ParseError(format!("Invalid storage URI: {uri}"));
        let (scheme, rest) = uri.split_once("://").ok_or_else(invalid)?;
        let (bucket, object) = rest.split_once('/').ok_or_else(invalid)?;
        if scheme.is_empty() || bucket.is_empty() || object.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            bucket: bucket.to_string(),
            object: object.to_string(),
        })
    }

    pub fn is_gcs(&self) -> bool {
        self.scheme == "gs"
    }
}

impl std::fmt::Display for StorageUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.object)
    }
}

/// Downloaded payload plus the content type the server reported.
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

#[async_trait::async_trait]
pub trait StorageDownloader: Send + Sync {
    async fn download(&self, uri: &StorageUri) -> Result<Downloaded, GenMediaError>;
}

/// Fetches a provider file handle into a local file.
#[async_trait::async_trait]
pub trait FileDownloader: Send + Sync {
    /// Write the file behind `handle` to `dest`, returning the reported content type.
    async fn download_to(&self, handle: &str, dest: &Path)
    -> Result<Option<String>, GenMediaError>;
}
