//! Governance errors.

use thiserror::Error;

use crate::http::HttpError;
use crate::retry::Retryable;

#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Failed to run '{command}': {message}")]
    Cli { command: String, message: String },

    #[error("'{command}' timed out after {secs}s")]
    CliTimeout { command: String, secs: u64 },

    #[error("Unexpected output from '{command}': {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error("No update image checksum for {version} in {url}")]
    MissingChecksum { version: String, url: String },

    #[error("Governance storage at {path}: {message}")]
    Storage { path: String, message: String },
}

impl GovernanceError {
    pub(crate) fn storage(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        GovernanceError::Storage {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

impl Retryable for GovernanceError {
    fn is_retryable(&self) -> bool {
        match self {
            GovernanceError::Http(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GovernanceError>;
