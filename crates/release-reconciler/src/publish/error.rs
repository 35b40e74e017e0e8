//! Publisher errors.

use thiserror::Error;

use crate::http::HttpError;
use crate::retry::Retryable;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Repository '{0}' is not of the form owner/name")]
    InvalidRepository(String),

    #[error("Publisher storage at {path}: {message}")]
    Storage { path: String, message: String },
}

impl PublishError {
    pub(crate) fn storage(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        PublishError::Storage {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

impl Retryable for PublishError {
    fn is_retryable(&self) -> bool {
        match self {
            PublishError::Http(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PublishError>;
