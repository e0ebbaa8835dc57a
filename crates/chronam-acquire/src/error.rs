use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    /// Bad input caught before any network activity.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("corpus not found: no metadata at {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: reqwest::StatusCode },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("giving up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AcquireError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AcquireError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether another attempt at the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AcquireError::Transport { .. } => true,
            AcquireError::Status { status, .. } => {
                *status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}

/// Why a single search result was left out of the corpus. Never fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("not a page-level result")]
    NotAPage,

    #[error("no image URL to derive the storage path from")]
    MissingImageUrl,

    #[error("image URL has no storage path fragment: {0}")]
    NoStoragePath(String),

    #[error("missing or unparseable date: {0:?}")]
    BadDate(Option<String>),

    #[error("unparseable {field}: '{value}'")]
    BadNumber { field: &'static str, value: String },

    #[error("invalid page identity: {0}")]
    BadIdentity(#[from] chronam_model::ModelError),

    #[error("undecodable result item: {0}")]
    Undecodable(String),
}

pub type Result<T> = std::result::Result<T, AcquireError>;
