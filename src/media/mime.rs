//! MIME type detection utilities
//!
//! Providers sometimes omit or mis-report the MIME type of generated media, so the
//! resolved type walks a fallback chain: declared field, then content-type header, then
//! magic-byte sniffing.

/// Used when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Types that carry no information about the payload.
pub fn is_generic(mime: &str) -> bool {
    let m = normalize(mime);
    m.is_empty() || m == OCTET_STREAM || m == "binary/octet-stream" || m == "application/unknown"
}

/// Lowercase and strip parameters (`image/PNG; charset=x` -> `image/png`).
pub fn normalize(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Sniff well-known image signatures.
///
/// - PNG: `89 50 4E 47 0D 0A 1A 0A`
/// - JPEG: `FF D8 FF`
/// - WEBP: `RIFF` + 4 size bytes + `WEBP`
/// - HEIC: 4 size bytes + `ftyp` + brand `heic|heix|hevc|hevx|heim|heis` (`mif1|msf1` is HEIF)
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return match &bytes[8..12] {
            b"heic" | b"heix" | b"hevc" | b"hevx" | b"heim" | b"heis" => Some("image/heic"),
            b"mif1" | b"msf1" => Some("image/heif"),
            _ => None,
        };
    }
    None
}

/// Guess MIME by inspecting bytes: image signatures first, then `infer` for video/audio.
pub fn guess_mime_from_bytes(bytes: &[u8]) -> Option<String> {
    if let Some(m) = sniff_image(bytes) {
        return Some(m.to_string());
    }
    infer::get(bytes).map(|k| k.mime_type().to_string())
}

/// Best-effort MIME for a payload.
pub fn resolve_mime(declared: Option<&str>, content_type: Option<&str>, bytes: &[u8]) -> String {
    if let Some(d) = declared
        && !is_generic(d)
    {
        return normalize(d);
    }
    if let Some(ct) = content_type
        && !is_generic(ct)
    {
        return normalize(ct);
    }
    guess_mime_from_bytes(bytes).unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// File extension for a resolved MIME type. Unknown types fall back to `png`.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match normalize(mime).as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        _ => "png",
    }
}

/// Guess MIME by file path or URL (extension-based).
pub fn mime_from_filename(path_or_url: &str) -> Option<String> {
    let ext = path_or_url
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    let known = match ext.as_deref() {
        Some("png") => Some("image/png"),
        Some("jpg") | Some("jpeg") => Some("image/jpeg"),
        Some("webp") => Some("image/webp"),
        Some("mp4") => Some("video/mp4"),
        Some("wav") => Some("audio/wav"),
        Some("mp3") => Some("audio/mpeg"),
        _ => None,
    };
    known.map(str::to_string).or_else(|| {
        mime_guess::from_path(path_or_url)
            .first_raw()
            .map(|s| s.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    #[test]
    fn png_bytes_beat_generic_content_type() {
        assert_eq!(
            resolve_mime(None, Some("application/octet-stream"), PNG),
            "image/png"
        );
    }

    #[test]
    fn declared_wins_over_sniffing() {
        assert_eq!(
            resolve_mime(Some("image/webp"), Some("image/png"), PNG),
            "image/webp"
        );
        assert_eq!(resolve_mime(None, Some("image/JPEG; q=1"), PNG), "image/jpeg");
    }

    #[test]
    fn sniffs_webp_and_heic() {
        let mut webp = b"RIFF\0\0\0\0WEBPVP8 ".to_vec();
        webp.extend_from_slice(&[0; 8]);
        assert_eq!(sniff_image(&webp), Some("image/webp"));

        let heic = b"\0\0\0\x18ftypheic\0\0\0\0";
        assert_eq!(sniff_image(heic), Some("image/heic"));
        let heif = b"\0\0\0\x18ftypmif1\0\0\0\0";
        assert_eq!(sniff_image(heif), Some("image/heif"));
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
    }

    #[test]
    fn unknown_bytes_are_octet_stream() {
        assert_eq!(resolve_mime(None, None, b"hello"), OCTET_STREAM);
    }

    #[test]
    fn extension_table() {
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/webp"), "webp");
        assert_eq!(extension_for_mime("image/heic"), "png");
        assert_eq!(extension_for_mime("video/mp4"), "mp4");
        assert_eq!(extension_for_mime("audio/wav"), "wav");
    }

    #[test]
    fn filename_round_trip() {
        for mime in ["image/png", "image/jpeg", "image/webp"] {
            let name = format!("Image_1_abcdef01.{}", extension_for_mime(mime));
            assert_eq!(mime_from_filename(&name).as_deref(), Some(mime));
        }
    }
}
