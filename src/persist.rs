//! Artifact persistence.
//!
//! The host's file service stores bytes under a name and hands back a URL. Artifact names
//! embed a content hash, so `ConflictPolicy::CreateNew` turns a repeated save of the same
//! bytes into a no-op.

use crate::error::GenMediaError;
use crate::media::mime::mime_from_filename;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A persisted, URL-addressable piece of generated media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub url: String,
    pub name: String,
    pub mime: String,
}

impl Artifact {
    /// MIME type recovered from the stored name's extension.
    pub fn mime_from_name(&self) -> Option<String> {
        mime_from_filename(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Never overwrite an existing file.
    #[default]
    CreateNew,
    Overwrite,
}

#[async_trait::async_trait]
pub trait ArtifactPersister: Send + Sync {
    /// Store `bytes` as `filename` and return a URL for it.
    async fn save(
        &self,
        bytes: &[u8],
        filename: &str,
        policy: ConflictPolicy,
    ) -> Result<String, GenMediaError>;
}

/// Source of the timestamp embedded in artifact names.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

const MAX_SUFFIX: u32 = 10_000;

/// Writes artifacts into a local directory and returns `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalDirPersister {
    root: PathBuf,
}

impl LocalDirPersister {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    fn validate_name(filename: &str) -> Result<(), GenMediaError> {
        let plain = Path::new(filename)
            .file_name()
            .is_some_and(|n| n == std::ffi::OsStr::new(filename));
        if filename.is_empty() || !plain {
            return Err(GenMediaError::InvalidParameter(format!(
                "Invalid artifact filename: {filename:?}"
            )));
        }
        Ok(())
    }

    /// `name.ext` → `name_{n}.ext`
    fn numbered(filename: &str, n: u32) -> String {
        match filename.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}_{n}.{ext}"),
            None => format!("{filename}_{n}"),
        }
    }

    /// Create `path` exclusively. `Ok(false)` when it already exists.
    async fn create_new(path: &Path, bytes: &[u8]) -> Result<bool, GenMediaError> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await;
        let file = match file {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        Self::fill_or_remove(file, path, bytes).await?;
        Ok(true)
    }

    /// Write `bytes` into the freshly created `path`. A failed write removes the file again.
    async fn fill_or_remove<W>(mut out: W, path: &Path, bytes: &[u8]) -> Result<(), GenMediaError>
    where
        W: AsyncWrite + Unpin,
    {
        let written = async {
            out.write_all(bytes).await?;
            out.flush().await
        }
        .await;
        if let Err(e) = written {
            drop(out);
            if let Err(cleanup) = tokio::fs::remove_file(path).await {
                tracing::warn!(path = %path.display(), error = %cleanup, "could not remove partial artifact");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ArtifactPersister for LocalDirPersister {
    async fn save(
        &self,
        bytes: &[u8],
        filename: &str,
        policy: ConflictPolicy,
    ) -> Result<String, GenMediaError> {
        Self::validate_name(filename)?;
        tokio::fs::create_dir_all(&self.root).await?;

        if policy == ConflictPolicy::Overwrite {
            let path = self.root.join(filename);
            tokio::fs::write(&path, bytes).await?;
            return Ok(Self::file_url(&path));
        }

        for n in 0..MAX_SUFFIX {
            let name = if n == 0 {
                filename.to_string()
            } else {
                Self::numbered(filename, n)
            };
            let path = self.root.join(&name);
            if Self::create_new(&path, bytes).await? {
                tracing::debug!(path = %path.display(), "artifact written");
                return Ok(Self::file_url(&path));
            }
            if tokio::fs::read(&path).await? == bytes {
                tracing::debug!(path = %path.display(), "identical artifact already stored");
                return Ok(Self::file_url(&path));
            }
        }
        Err(GenMediaError::IoError(format!(
            "Could not find a free name for {filename}"
        )))
    }
}
