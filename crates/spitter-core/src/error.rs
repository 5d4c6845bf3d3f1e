//! Error types for the sync engine.
//!
//! Every phase of a sync fails fast with one of these variants and the
//! orchestrator hands it back to the caller unchanged.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    // Validation errors
    #[error("invalid remote server URL: {endpoint} ({reason})")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("invalid model name {name:?}: {reason}")]
    InvalidModelName { name: String, reason: String },

    // Local store errors
    #[error("model not found in {0}")]
    NotFound(PathBuf),

    #[error("malformed manifest at {path:?}: {message}")]
    Parse {
        message: String,
        path: PathBuf,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Remote errors
    #[error("network error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("upload failed for {digest}: {status} {body}")]
    UploadRejected {
        digest: String,
        status: u16,
        body: String,
    },

    #[error("could not create {name} on the remote server ({status}): {reason}")]
    RemoteRejected {
        name: String,
        status: u16,
        reason: String,
    },

    // Definition errors
    #[error("could not get ollama Modelfile for {model}: {message}")]
    DefinitionUnavailable { model: String, message: String },
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SyncError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SyncError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a transport error with a message and the underlying client error.
    pub fn transport(message: impl Into<String>, source: reqwest::Error) -> Self {
        SyncError::Transport {
            message: format!("{}: {}", message.into(), source),
            source: Some(source),
        }
    }

    /// Name of the error class, stable across message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::InvalidEndpoint { .. } => "InvalidEndpoint",
            SyncError::InvalidModelName { .. } => "InvalidModelName",
            SyncError::NotFound(_) => "NotFound",
            SyncError::Parse { .. } => "ParseError",
            SyncError::Io { .. } => "IOError",
            SyncError::Transport { .. } => "TransportError",
            SyncError::UploadRejected { .. } => "UploadRejected",
            SyncError::RemoteRejected { .. } => "RemoteRejected",
            SyncError::DefinitionUnavailable { .. } => "DefinitionUnavailable",
        }
    }

    /// Whether simply re-running the sync has a reasonable chance of succeeding.
    ///
    /// Blob uploads are skipped for anything the remote already holds, so a
    /// re-run only pays for what is still missing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport { .. })
    }
}
