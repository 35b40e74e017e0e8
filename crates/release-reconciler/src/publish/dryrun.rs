//! Pull requests recorded on local disk instead of opened on GitHub.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::{PublishError, Result};
use super::publisher::{
    branch_name, changelog_path, published_url, pull_request_title, ChangelogPublisher,
    PublishedChangelog,
};
use crate::types::OsKind;

pub const PULL_REQUESTS_FILE: &str = "pull-requests.json";

const DRY_RUN_REPO: &str = "dfinity/dre-testing";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPullRequest {
    pub branch: String,
    pub path: String,
    pub title: String,
    pub changelog: String,
}

pub struct DryRunPublisher {
    storage: Option<PathBuf>,
    pulls: Mutex<Vec<StoredPullRequest>>,
}

impl DryRunPublisher {
    pub fn in_memory() -> Self {
        Self {
            storage: None,
            pulls: Mutex::new(Vec::new()),
        }
    }

    pub fn open(folder: impl Into<PathBuf>) -> Result<Self> {
        let folder = folder.into();
        let file = folder.join(PULL_REQUESTS_FILE);
        let pulls = if file.exists() {
            let data = std::fs::read(&file).map_err(|e| PublishError::storage(&file, e))?;
            serde_json::from_slice(&data).map_err(|e| PublishError::storage(&file, e))?
        } else {
            Vec::new()
        };
        Ok(Self {
            storage: Some(folder),
            pulls: Mutex::new(pulls),
        })
    }

    pub fn pull_requests(&self) -> Vec<StoredPullRequest> {
        self.pulls.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

fn persist(folder: &Path, pulls: &[StoredPullRequest]) -> Result<()> {
    let file = folder.join(PULL_REQUESTS_FILE);
    std::fs::create_dir_all(folder).map_err(|e| PublishError::storage(folder, e))?;
    let data = serde_json::to_vec_pretty(pulls).map_err(|e| PublishError::storage(&file, e))?;
    std::fs::write(&file, data).map_err(|e| PublishError::storage(&file, e))
}

#[async_trait]
impl ChangelogPublisher for DryRunPublisher {
    async fn ensure_published(
        &self,
        version: &str,
        os_kind: OsKind,
        changelog: &str,
    ) -> Result<PublishedChangelog> {
        let branch = branch_name(version, os_kind);
        let url = published_url(DRY_RUN_REPO, version, os_kind);
        let mut pulls = self.pulls.lock().unwrap_or_else(|p| p.into_inner());
        if pulls.iter().any(|p| p.branch == branch) {
            return Ok(PublishedChangelog { url, opened: false });
        }

        log::warn!("Would open pull request '{}' from {}", pull_request_title(version), branch);
        pulls.push(StoredPullRequest {
            branch,
            path: changelog_path(version, os_kind),
            title: pull_request_title(version),
            changelog: changelog.to_string(),
        });
        if let Some(folder) = &self.storage {
            persist(folder, &pulls)?;
        }
        Ok(PublishedChangelog { url, opened: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::publisher::publish_if_ready;
    use tempfile::TempDir;

    const APPROVED: &str = "# Review checklist\n\n* ~~@node-team~~\n\n# Release Notes for x\n\nbody\n";

    #[tokio::test]
    async fn test_publish_once_and_persist() {
        let tmp = TempDir::new().unwrap();
        let publisher = DryRunPublisher::open(tmp.path()).unwrap();

        let first = publish_if_ready(&publisher, Some(APPROVED), "abc", OsKind::HostOs)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.changelog, "# Release Notes for x\n\nbody\n");
        publish_if_ready(&publisher, Some(APPROVED), "abc", OsKind::HostOs)
            .await
            .unwrap();

        let reopened = DryRunPublisher::open(tmp.path()).unwrap();
        let pulls = reopened.pull_requests();
        assert_eq!(pulls.len(), 1);
        assert_eq!(pulls[0].path, "host-os-releases/abc.md");
        assert_eq!(pulls[0].title, "Elect version abc");
    }

    #[tokio::test]
    async fn test_unapproved_notes_are_not_published() {
        let publisher = DryRunPublisher::in_memory();
        let pending = APPROVED.replace("~~@node-team~~", "@node-team");
        let result = publish_if_ready(&publisher, Some(&pending), "abc", OsKind::HostOs)
            .await
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(publish_if_ready(&publisher, None, "abc", OsKind::HostOs).await.unwrap(), None);
        assert!(publisher.pull_requests().is_empty());
    }
}
