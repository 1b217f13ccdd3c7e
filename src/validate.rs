// Structural URL validation.

use url::Url;

/// Returns true iff `raw` parses into an absolute URL with a scheme and a
/// non-empty host. No network access is performed.
pub fn is_valid_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(parsed) => parsed.host_str().map_or(false, |h| !h.is_empty()),
        Err(_) => false,
    }
}
