//! Source adapter error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The adapter has no usable configuration. Operations fail with this
    /// error until a valid config record arrives; the process keeps running.
    #[error("source adapter is not configured")]
    NotConfigured,

    #[error("listing failed: {0}")]
    ListFailed(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for SourceError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        SourceError::InvalidHeader(err.to_string())
    }
}
