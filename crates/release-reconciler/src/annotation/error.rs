//! Commit annotation errors.

use thiserror::Error;

use crate::http::HttpError;
use crate::mirror::MirrorError;
use crate::retry::Retryable;
use crate::types::OsKind;

#[derive(Error, Debug)]
pub enum AnnotationError {
    /// The commit has not been annotated yet; try again on a later pass.
    #[error("Commit {commit} has no {os_kind} annotation yet")]
    NotReady { commit: String, os_kind: OsKind },

    #[error("Unexpected annotation '{content}' for commit {commit} in {namespace}")]
    UnexpectedNote {
        commit: String,
        namespace: String,
        content: String,
    },

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Http(#[from] HttpError),
}

impl AnnotationError {
    pub fn is_not_ready(&self) -> bool {
        matches!(self, AnnotationError::NotReady { .. })
    }

    pub(crate) fn tool(tool: &str, message: impl Into<String>) -> Self {
        AnnotationError::Tool {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

impl Retryable for AnnotationError {
    fn is_retryable(&self) -> bool {
        match self {
            AnnotationError::Tool { .. } => true,
            AnnotationError::Mirror(e) => e.is_retryable(),
            AnnotationError::Http(e) => e.is_retryable(),
            AnnotationError::NotReady { .. } | AnnotationError::UnexpectedNote { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AnnotationError>;
