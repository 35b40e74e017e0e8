use thiserror::Error;

use crate::annotation::AnnotationError;
use crate::config::ConfigError;
use crate::docs::DocumentError;
use crate::forum::ForumError;
use crate::governance::GovernanceError;
use crate::http::HttpError;
use crate::index::IndexError;
use crate::mirror::MirrorError;
use crate::notes::NotesError;
use crate::publish::PublishError;
use crate::retry::Retryable;
use crate::secrets::SecretError;
use crate::state::StateError;

/// How the loop reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Prerequisites missing; the next pass tries again.
    NotReady,
    /// Retried within the step, then skipped until the next pass.
    Transient,
    /// A submission may have left partial state; retried after a delay.
    Malfunction,
    /// Bad input; the offending release is left alone.
    Invalid,
    /// The process must stop.
    Fatal,
}

#[derive(Error, Debug)]
pub enum ReconcilerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Secret(#[from] SecretError),

    #[error("Release index error: {0}")]
    Index(#[from] IndexError),

    #[error("Mirror error: {0}")]
    Mirror(#[from] MirrorError),

    #[error("Annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    #[error("Release notes error: {0}")]
    Notes(#[from] NotesError),

    #[error("Forum error: {0}")]
    Forum(#[from] ForumError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Governance error: {0}")]
    Governance(#[from] GovernanceError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("No earlier release to compare {version} against")]
    NoBaseRelease { version: String },

    #[error("{0}")]
    Fatal(String),
}

impl ReconcilerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcilerError::Annotation(e) if e.is_not_ready() => ErrorClass::NotReady,
            ReconcilerError::Notes(e) if e.is_not_ready() => ErrorClass::NotReady,
            ReconcilerError::Index(IndexError::Mirror(_)) => ErrorClass::Transient,
            ReconcilerError::Index(_)
            | ReconcilerError::Config(_)
            | ReconcilerError::Secret(_)
            | ReconcilerError::NoBaseRelease { .. } => ErrorClass::Invalid,
            ReconcilerError::Governance(
                GovernanceError::Cli { .. }
                | GovernanceError::CliTimeout { .. }
                | GovernanceError::UnexpectedOutput { .. },
            ) => ErrorClass::Malfunction,
            ReconcilerError::State(_) | ReconcilerError::Fatal(_) => ErrorClass::Fatal,
            _ => ErrorClass::Transient,
        }
    }
}

impl Retryable for ReconcilerError {
    fn is_retryable(&self) -> bool {
        match self {
            ReconcilerError::Index(e) => e.is_retryable(),
            ReconcilerError::Mirror(e) => e.is_retryable(),
            ReconcilerError::Annotation(e) => e.is_retryable(),
            ReconcilerError::Notes(e) => e.is_retryable(),
            ReconcilerError::Forum(e) => e.is_retryable(),
            ReconcilerError::Document(e) => e.is_retryable(),
            ReconcilerError::Publish(e) => e.is_retryable(),
            ReconcilerError::Governance(e) => e.is_retryable(),
            ReconcilerError::Http(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcilerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OsKind;

    #[test]
    fn test_error_classes() {
        let not_ready: ReconcilerError = AnnotationError::NotReady {
            commit: "a".into(),
            os_kind: OsKind::GuestOs,
        }
        .into();
        assert_eq!(not_ready.class(), ErrorClass::NotReady);

        let notes_not_ready: ReconcilerError = NotesError::Annotation(AnnotationError::NotReady {
            commit: "a".into(),
            os_kind: OsKind::HostOs,
        })
        .into();
        assert_eq!(notes_not_ready.class(), ErrorClass::NotReady);

        let invalid: ReconcilerError = IndexError::InvalidRcName("x".into()).into();
        assert_eq!(invalid.class(), ErrorClass::Invalid);

        let malfunction: ReconcilerError = GovernanceError::Cli {
            command: "dre propose".into(),
            message: "exit status 1".into(),
        }
        .into();
        assert_eq!(malfunction.class(), ErrorClass::Malfunction);

        let transient: ReconcilerError = HttpError::Timeout { url: "u".into() }.into();
        assert_eq!(transient.class(), ErrorClass::Transient);
        assert!(transient.is_retryable());
    }
}
