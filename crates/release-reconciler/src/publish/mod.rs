//! Publishing approved release notes to the canonical repository.

pub mod dryrun;
pub mod error;
pub mod github;
pub mod publisher;
pub mod readiness;

pub use dryrun::{DryRunPublisher, StoredPullRequest, PULL_REQUESTS_FILE};
pub use error::{PublishError, Result};
pub use github::GitHubPublisher;
pub use publisher::{
    branch_name, changelog_path, publish_if_ready, published_url, ChangelogPublisher,
    Publication, PublishedChangelog, DEFAULT_PUBLISH_REPO,
};
pub use readiness::prepare_publication;
