//! Artifact filenames.
//!
//! `{prefix}_{unix_millis}_{md5[..8]}.{ext}`: deterministic for a given prefix, timestamp
//! and content, so a storage layer that refuses to overwrite de-duplicates naturally.

use crate::media::mime::extension_for_mime;
use md5::{Digest, Md5};

/// First 8 hex characters of the MD5 digest of `bytes`.
pub fn content_hash8(bytes: &[u8]) -> String {
    let digest = Md5::digest(bytes);
    let mut hex = hex::encode(digest);
    hex.truncate(8);
    hex
}

pub fn artifact_filename(prefix: &str, unix_millis: i64, bytes: &[u8], mime: &str) -> String {
    format!(
        "{prefix}_{unix_millis}_{}.{}",
        content_hash8(bytes),
        extension_for_mime(mime)
    )
}
