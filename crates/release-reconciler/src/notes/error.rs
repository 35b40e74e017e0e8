//! Release-notes composition errors.

use thiserror::Error;

use crate::annotation::AnnotationError;
use crate::mirror::MirrorError;
use crate::retry::Retryable;

#[derive(Error, Debug)]
pub enum NotesError {
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error("Release commit {0} is not known to the mirror")]
    UnknownCommit(String),

    #[error("Commit fact collection did not finish: {0}")]
    Collection(#[from] tokio::task::JoinError),
}

impl NotesError {
    /// A commit in the range has no verdict yet.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, NotesError::Annotation(e) if e.is_not_ready())
    }
}

impl Retryable for NotesError {
    fn is_retryable(&self) -> bool {
        match self {
            NotesError::Mirror(e) => e.is_retryable(),
            NotesError::Annotation(e) => e.is_retryable(),
            NotesError::UnknownCommit(_) | NotesError::Collection(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, NotesError>;
