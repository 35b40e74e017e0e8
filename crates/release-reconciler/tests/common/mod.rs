//! Shared utilities for release-reconciler integration tests.
//!
//! - `TestHarness`: a temporary Git origin with a mirror of it, and every
//!   collaborator in its dry-run form
//! - builders for release index documents

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
