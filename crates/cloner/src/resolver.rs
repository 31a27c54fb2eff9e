//! Reference resolution against a page's base URL.

use url::Url;

/// Extension used for images whose URL path carries none.
pub const DEFAULT_IMAGE_EXTENSION: &str = ".png";

/// Join `reference` against `base` using WHATWG URL rules.
///
/// Absolute references pass through, protocol-relative ones inherit the
/// base scheme. If either side cannot be parsed the raw reference is
/// returned; the fetch will then fail and the reference stays as is.
pub fn resolve(base: &str, reference: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(reference))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| reference.to_string())
}

/// Whether `resolved` is an `http(s)` URL with a host, i.e. something a
/// browser can load as a document base.
pub fn is_web_url(resolved: &str) -> bool {
    Url::parse(resolved)
        .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

/// The extension (with leading dot) of the last path segment of a
/// resolved image URL, or [`DEFAULT_IMAGE_EXTENSION`].
///
/// The extension keeps its case. Only short alphanumeric extensions are
/// kept so the local filename stays safe.
pub fn image_extension(resolved: &str) -> String {
    let Ok(url) = Url::parse(resolved) else {
        return DEFAULT_IMAGE_EXTENSION.to_string();
    };

    let segment = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or("");

    match segment.rfind('.') {
        Some(pos) if pos > 0 => {
            let ext = &segment[pos + 1..];
            if !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
            {
                format!(".{ext}")
            } else {
                DEFAULT_IMAGE_EXTENSION.to_string()
            }
        }
        _ => DEFAULT_IMAGE_EXTENSION.to_string(),
    }
}
