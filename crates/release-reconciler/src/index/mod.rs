//! The declarative release index.

pub mod error;
pub mod loader;
pub mod model;
pub mod summary;

pub use error::{IndexError, Result};
pub use loader::{
    parse_release_index, parse_release_index_lenient, FileIndexSource, GitIndexSource,
    LoadedIndex, RejectedRelease, ReleaseIndexSource, StaticIndexSource, RELEASE_INDEX_FILE,
};
pub use model::{document_title, human_tag, Release, ReleaseIndex, Version, BASE_VERSION_NAME};
pub use summary::proposal_summary;
