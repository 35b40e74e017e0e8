//! The control loop.
//!
//! Every pass reloads the release index, refreshes the mirror and the
//! governance view, then walks each active (version, OS kind) pair through
//! notes, review, publication, proposal and tagging. Each step is idempotent,
//! so a pass that is interrupted anywhere is simply finished by the next one.

pub mod active;
pub mod pass;
pub mod runner;

pub use active::{
    active_releases, find_base_release, versions_to_unelect, BaseRelease, MIN_ACTIVE_RELEASES,
};
pub use pass::{Collaborators, PassReport, Reconciler, ReconcilerSettings};
pub use runner::{Runner, StopHandle};
