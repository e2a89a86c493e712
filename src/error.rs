//! Typed errors at the boundaries callers branch on.
//!
//! Everything else flows through `anyhow`.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single engine call. Recorded on the session, never retried.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("engine request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid JSON response: {0}")]
    Decode(String),
    /// The backend answered 2xx but put an `error` field in the body.
    #[error("{0}")]
    EngineReported(String),
}

impl InvokeError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            InvokeError::Timeout(timeout)
        } else if err.is_decode() {
            InvokeError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            InvokeError::Status(status.as_u16())
        } else {
            InvokeError::Transport(err.to_string())
        }
    }
}

/// Run-level control errors returned by runner entry points.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no file uploaded")]
    NoUpload,
    #[error("an analysis run is already in progress")]
    AlreadyRunning,
    #[error("saved session for {saved:?} cannot be resumed against {current:?}")]
    NotResumable { saved: String, current: String },
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("upload rejected: HTTP {0}")]
    Status(u16),
    #[error("upload failed: {0}")]
    Request(#[from] reqwest::Error),
}
