//! Forum errors.

use thiserror::Error;

use crate::http::HttpError;
use crate::retry::Retryable;

#[derive(Error, Debug)]
pub enum ForumError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Topic {0} does not exist")]
    TopicNotFound(u64),

    #[error("Post {0} does not exist")]
    PostNotFound(u64),

    #[error("Forum storage at {path}: {message}")]
    Storage { path: String, message: String },
}

impl ForumError {
    pub(crate) fn storage(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        ForumError::Storage {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

impl Retryable for ForumError {
    fn is_retryable(&self) -> bool {
        match self {
            ForumError::Http(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ForumError>;
