//! Filename handling for keys and download headers.
//!
//! Client-supplied names end up inside the object key and inside the
//! `Content-Disposition` header, so they are reduced to a single path segment
//! with no control characters or quotes before use.

/// Name used when a client sends no usable filename.
pub const FALLBACK_FILENAME: &str = "downloaded-file";

const MAX_FILENAME_CHARS: usize = 255;

/// Reduce a client-supplied filename to a safe single segment.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .take(MAX_FILENAME_CHARS)
        .collect();
    let trimmed = cleaned.trim();

    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `Content-Disposition` value forcing a download under `filename`.
///
/// The quoted `filename` parameter is an ASCII approximation; `filename*`
/// carries the exact UTF-8 name (RFC 6266 / RFC 5987).
pub fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if ascii == filename {
        format!("attachment; filename=\"{}\"", ascii)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            ascii,
            urlencoding::encode(filename)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_are_kept() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("my holiday photo.jpg"), "my holiday photo.jpg");
        assert_eq!(sanitize_filename("naïve.txt"), "naïve.txt");
    }

    #[test]
    fn test_path_components_are_stripped() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\notes.txt"), "notes.txt");
        assert_eq!(sanitize_filename("dir/"), FALLBACK_FILENAME);
    }

    #[test]
    fn test_header_breaking_characters_are_removed() {
        assert_eq!(sanitize_filename("evil\"\r\nX-Injected: 1.txt"), "evilX-Injected: 1.txt");
        assert_eq!(sanitize_filename("tab\there.txt"), "tabhere.txt");
    }

    #[test]
    fn test_unusable_names_fall_back() {
        assert_eq!(sanitize_filename(""), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("   "), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename(".."), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("\"\""), FALLBACK_FILENAME);
    }

    #[test]
    fn test_long_names_are_truncated() {
        let long = "a".repeat(1000);
        assert_eq!(sanitize_filename(&long).chars().count(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn test_ascii_disposition() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
    }

    #[test]
    fn test_unicode_disposition_has_extended_parameter() {
        let value = content_disposition("résumé.pdf");
        assert_eq!(
            value,
            "attachment; filename=\"r_sum_.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
        );
        assert!(value.is_ascii());
    }
}
