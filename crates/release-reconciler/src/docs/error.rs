//! Change-log document errors.

use thiserror::Error;

use crate::http::HttpError;
use crate::retry::Retryable;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Document storage at {path}: {message}")]
    Storage { path: String, message: String },

    #[error("Failed to convert document: {0}")]
    Conversion(String),
}

impl DocumentError {
    pub(crate) fn storage(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        DocumentError::Storage {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

impl Retryable for DocumentError {
    fn is_retryable(&self) -> bool {
        match self {
            DocumentError::Http(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DocumentError>;
