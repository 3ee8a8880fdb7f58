// Error taxonomy for the tool. Startup problems (`ConfigError`) abort the
// process; everything else is caught at the module boundary and printed.

use std::path::PathBuf;
use thiserror::Error;

/// Problems reading `config.json`. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config must contain '{0}'")]
    MissingField(&'static str),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures talking to the remote service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection failure, timeout, or any other transport problem. The
    /// request URL is stripped since query strings carry the token.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Non-2xx response. The status code is kept exactly as received.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx response whose body reports `"status": false`.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("cannot read attachment {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// Status code for `Status` errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(e.without_url())
    }
}

/// Malformed user input. Reported inline and the user is asked again.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("input must not be empty")]
    Empty,

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("not a regular file: {0}")]
    NotAFile(String),

    #[error("invalid file type: '{0}'")]
    UnsupportedType(String),

    #[error("invalid status '{0}' (expected Passed, Failed or Blocked)")]
    UnknownStatus(String),
}
