//! Error types shared by the resolvers and the delivery path

use thiserror::Error;

/// Why a link could not be turned into media.
///
/// The `Display` text is shown to chat users verbatim, so it stays short and
/// never includes backtraces or debug dumps.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The URL host is not owned by any resolver
    #[error("{0}")]
    UnsupportedDomain(String),

    /// Upstream answered with a non-200 status or could not be reached
    #[error("{0}")]
    FetchFailure(String),

    /// Upstream was reachable but exposed no usable media URL
    #[error("{0}")]
    NoMediaFound(String),

    /// JSON or HTML did not have the expected shape
    #[error("{0}")]
    MalformedUpstreamResponse(String),

    /// The URL lacks the path segments a resolver needs
    #[error("{0}")]
    UnrecognizedUrlFormat(String),
}

impl ResolveError {
    pub fn unsupported_domain() -> Self {
        ResolveError::UnsupportedDomain("Unsupported URL domain.".to_string())
    }

    /// Short machine-friendly label, used as a tracing field
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::UnsupportedDomain(_) => "unsupported_domain",
            ResolveError::FetchFailure(_) => "fetch_failure",
            ResolveError::NoMediaFound(_) => "no_media_found",
            ResolveError::MalformedUpstreamResponse(_) => "malformed_upstream_response",
            ResolveError::UnrecognizedUrlFormat(_) => "unrecognized_url_format",
        }
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ResolveError::FetchFailure(format!("Request timed out: {}", err))
        } else if err.is_decode() {
            ResolveError::MalformedUpstreamResponse(format!("Could not decode response: {}", err))
        } else {
            ResolveError::FetchFailure(format!("Request failed: {}", err))
        }
    }
}

/// Failure while downloading or uploading an already-resolved asset.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("could not convert HEIC image: {0}")]
    Transcode(String),

    #[error("upload failed: {0:#}")]
    Upload(anyhow::Error),
}
