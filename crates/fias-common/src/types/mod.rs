//! Common types used across the FIAS workspace

use crate::error::{FiasError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Checksum algorithm type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
            ChecksumAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

/// Validate that `raw` has the shape of an absolute HTTP(S) URL with a host.
///
/// Returns the parsed URL so callers can reuse it.
///
/// # Examples
///
/// ```
/// use fias_common::types::validate_http_url;
///
/// assert!(validate_http_url("https://fias.nalog.ru/file.zip").is_ok());
/// assert!(validate_http_url("ftp://fias.nalog.ru/file.zip").is_err());
/// ```
pub fn validate_http_url(raw: &str) -> Result<Url> {
    let invalid = |reason: &str| FiasError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("URL is empty"));
    }

    let url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {},
        other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(invalid("URL has no host"));
    }

    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_http_url_accepts_http_and_https() {
        assert!(validate_http_url("http://example.com/a.zip").is_ok());
        assert!(validate_http_url("https://example.com:8443/path?q=1").is_ok());
    }

    #[test]
    fn test_validate_http_url_rejects_other_shapes() {
        for raw in ["", "   ", "example.com/a.zip", "ftp://example.com/a.zip", "file:///tmp/a"] {
            let err = validate_http_url(raw).unwrap_err();
            assert!(matches!(err, FiasError::InvalidUrl { .. }), "{raw}");
        }
    }

    #[test]
    fn test_checksum_algorithm_display() {
        assert_eq!(ChecksumAlgorithm::Sha256.to_string(), "sha256");
        assert_eq!(ChecksumAlgorithm::default(), ChecksumAlgorithm::Sha256);
    }
}
