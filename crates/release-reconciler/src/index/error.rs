//! Release index errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::mirror::MirrorError;
use crate::retry::Retryable;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to read release index '{path}': {message}")]
    ReadFile { path: PathBuf, message: String },

    #[error("Failed to parse release index: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Invalid release name '{0}': expected rc--YYYY-MM-DD_HH-MM")]
    InvalidRcName(String),

    #[error("Release '{rc_name}' has no versions")]
    EmptyRelease { rc_name: String },

    #[error("Release '{rc_name}' declares version name '{name}' more than once")]
    DuplicateName { rc_name: String, name: String },

    #[error("Release '{rc_name}' must declare exactly one 'base' version (found {found})")]
    MissingBase { rc_name: String, found: usize },

    #[error("Release '{rc_name}' is not older than the release listed before it ('{previous}')")]
    NotDescending { rc_name: String, previous: String },

    #[error("Release '{rc_name}' version '{name}' has an invalid commit id '{commit}'")]
    InvalidCommit {
        rc_name: String,
        name: String,
        commit: String,
    },

    #[error("Index repository error: {0}")]
    Mirror(#[from] MirrorError),
}

impl Retryable for IndexError {
    fn is_retryable(&self) -> bool {
        match self {
            IndexError::Mirror(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
