//! Error types for the download engine.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use worldpop_common::WorldPopError;

/// Result type alias using DownloadError.
pub type DownloadResult<T> = Result<T, DownloadError>;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    Status(StatusCode),

    #[error("Server did not declare a Content-Length")]
    MissingContentLength,

    #[error("Download size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download of {url} failed after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: Box<DownloadError>,
    },

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

impl DownloadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP-layer failures are retried; local filesystem failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            DownloadError::Http(_)
            | DownloadError::Status(_)
            | DownloadError::MissingContentLength
            | DownloadError::SizeMismatch { .. } => true,
            DownloadError::RetriesExhausted { last, .. } => last.is_transient(),
            DownloadError::Io { .. } | DownloadError::Client(_) => false,
        }
    }
}

impl From<DownloadError> for WorldPopError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::RetriesExhausted {
                url,
                attempts,
                last,
            } => WorldPopError::TransientNetwork {
                url,
                attempts,
                message: last.to_string(),
            },
            DownloadError::Io { source, .. } => WorldPopError::Io(source),
            DownloadError::Client(msg) => WorldPopError::Config(msg),
            other => WorldPopError::TransientNetwork {
                url: String::new(),
                attempts: 1,
                message: other.to_string(),
            },
        }
    }
}
