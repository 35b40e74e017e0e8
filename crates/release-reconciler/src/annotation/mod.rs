//! Commit classification: does a commit change an OS image?
//!
//! Verdicts are stored as Git notes (`guestos-changed`, `hostos-changed`) with
//! the image's package listing alongside (`guestos-targets`, `hostos-targets`).
//! The reconciler reads them through a [`CommitChangeDeterminator`]; the
//! [`Annotator`] produces them.

pub mod annotator;
pub mod determinator;
pub mod error;
pub mod remote;

pub use annotator::{
    Annotation, Annotator, AnnotatorSettings, RecomputingDeterminator, DEFAULT_BRANCH_GLOBS,
    DEFAULT_MAX_BRANCH_AGE_DAYS,
};
pub use determinator::{
    CommitChangeDeterminator, LocalNotesDeterminator, MemoizingDeterminator, StaticDeterminator,
};
pub use error::{AnnotationError, Result};
pub use remote::RemoteDeterminator;
