//! Release-notes composition.
//!
//! Commits between two releases are described (type, scope, owning teams,
//! author), filtered against the OS image and rendered as Markdown with a
//! reviewer checklist on top.

pub mod change;
pub mod codeowners;
pub mod commit;
pub mod composer;
pub mod error;
pub mod facts;
pub mod filters;
pub mod render;
pub mod teams;

pub use change::{describe_change, Change, CommitFacts, COMMIT_HASH_LENGTH};
pub use codeowners::{CodeOwners, CODEOWNERS_PATH};
pub use commit::{ChangeType, ConventionalCommit};
pub use composer::{ReleaseNotesComposer, ReleaseNotesRequest};
pub use error::{NotesError, Result};
pub use render::{
    render_ordinary, render_security, NotesHeader, EXCLUDED_CHANGES_HEADING,
    RELEASE_NOTES_HEADING, REVIEW_CHECKLIST_HEADING, REVIEW_INSTRUCTIONS,
};
pub use teams::{reviewers, Reviewer};
