//! Local mirrors of the monitored Git repositories.
//!
//! The mirror shells out to the `git` binary. Network operations (clone,
//! fetch, push) run asynchronously with a timeout and optional token
//! authentication; everything else reads the local object store.

pub mod auth;
pub mod error;
pub mod parse;
pub mod repository;
pub mod types;

pub use error::{MirrorError, Result};
pub use repository::{SourceMirror, WorktreeGuard};
pub use types::{FileChange, MirrorSettings, TagOutcome};
