//! Release reconciler: drives GuestOS and HostOS release elections from a
//! declarative release index.

pub mod annotation;
pub mod clock;
pub mod config;
pub mod docs;
pub mod error;
pub mod forum;
pub mod governance;
pub mod http;
pub mod index;
pub mod logging;
pub mod mirror;
pub mod notes;
pub mod publish;
pub mod reconciler;
pub mod retry;
pub mod secrets;
pub mod state;
pub mod types;
pub mod watchdog;

pub use config::{AnnotatorSource, ConfigError, ReconcilerConfig};
pub use error::{ErrorClass, ReconcilerError, Result};
pub use reconciler::{Collaborators, PassReport, Reconciler, ReconcilerSettings, Runner};
pub use state::{ProposalState, ReconcilerState};
pub use types::{CommitInclusion, OsKind};
pub use watchdog::Watchdog;
