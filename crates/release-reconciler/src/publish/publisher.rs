//! The publishing contract and the naming rules shared by its backends.

use async_trait::async_trait;

use super::error::Result;
use super::readiness::prepare_publication;
use crate::types::OsKind;

pub const DEFAULT_PUBLISH_REPO: &str = "dfinity/dre";
pub const PUBLISH_BASE_BRANCH: &str = "main";

/// A changelog that has a pull request in the canonical repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedChangelog {
    /// Where the changelog lives once merged.
    pub url: String,
    /// False when an earlier pass already opened the pull request.
    pub opened: bool,
}

/// Approved notes and where they were published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub changelog: String,
    pub url: String,
}

#[async_trait]
pub trait ChangelogPublisher: Send + Sync {
    /// Opens a pull request adding `changelog` for `version`, unless one
    /// (open, merged or closed) already exists for its branch.
    async fn ensure_published(
        &self,
        version: &str,
        os_kind: OsKind,
        changelog: &str,
    ) -> Result<PublishedChangelog>;
}

/// Head branch of the pull request for a version.
pub fn branch_name(version: &str, os_kind: OsKind) -> String {
    match os_kind {
        OsKind::GuestOs => format!("replica-release-notes-{}", version),
        OsKind::HostOs => format!("hostos-release-notes-{}", version),
    }
}

/// Path of the changelog within the canonical repository.
pub fn changelog_path(version: &str, os_kind: OsKind) -> String {
    format!("{}/{}.md", os_kind.releases_dir(), version)
}

pub fn pull_request_title(version: &str) -> String {
    format!("Elect version {}", version)
}

/// Browsable location of the changelog on the base branch.
pub fn published_url(repo: &str, version: &str, os_kind: OsKind) -> String {
    format!(
        "https://github.com/{}/blob/{}/{}",
        repo,
        PUBLISH_BASE_BRANCH,
        changelog_path(version, os_kind)
    )
}

/// Publishes the notes if every reviewer has signed off.
///
/// Returns `None` while there are no notes or they are still under review.
pub async fn publish_if_ready(
    publisher: &dyn ChangelogPublisher,
    markdown: Option<&str>,
    version: &str,
    os_kind: OsKind,
) -> Result<Option<Publication>> {
    let Some(markdown) = markdown else {
        log::info!("No notes yet for {} {}, nothing to publish", version, os_kind);
        return Ok(None);
    };
    let Some(changelog) = prepare_publication(markdown) else {
        log::info!("Release notes for {} {} not yet approved", version, os_kind);
        return Ok(None);
    };

    let published = publisher.ensure_published(version, os_kind, &changelog).await?;
    if published.opened {
        log::info!("Opened pull request for {} {} notes", version, os_kind);
    }
    Ok(Some(Publication {
        changelog,
        url: published.url,
    }))
}
