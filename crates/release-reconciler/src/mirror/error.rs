//! Mirror-specific error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::retry::Retryable;

/// Errors that can occur while operating the source-repo mirror.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Git network error: {0}")]
    GitNetworkError(String),

    #[error("Git operation timed out after {0}s")]
    GitTimeout(u64),

    #[error("Git authentication failed: {0}")]
    GitAuthFailed(String),

    #[error("Mirror at '{0}' is not a git repository")]
    NotInitialized(PathBuf),

    #[error("Unknown revision '{0}'")]
    UnknownRevision(String),

    #[error("Unexpected git output for '{command}': {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error("File operation failed: {0}")]
    FileOperation(String),
}

impl From<std::io::Error> for MirrorError {
    fn from(err: std::io::Error) -> Self {
        MirrorError::FileOperation(err.to_string())
    }
}

impl Retryable for MirrorError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            MirrorError::GitNetworkError(_) | MirrorError::GitTimeout(_)
        )
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(stderr: &str) -> MirrorError {
    let lower = stderr.to_lowercase();

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("the remote end hung up unexpectedly")
        || lower.contains("early eof")
    {
        return MirrorError::GitNetworkError(stderr.trim().to_string());
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid username or password")
        || lower.contains("could not read username")
    {
        return MirrorError::GitAuthFailed(stderr.trim().to_string());
    }

    if lower.contains("unknown revision")
        || lower.contains("bad revision")
        || lower.contains("not a valid object name")
        || lower.contains("needed a single revision")
    {
        return MirrorError::UnknownRevision(stderr.trim().to_string());
    }

    MirrorError::GitOperation(stderr.trim().to_string())
}

/// Result type for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;
