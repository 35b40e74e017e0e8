//! Change-log documents kept as HTML files in a local folder.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::convert::{html_to_markdown, markdown_to_html};
use super::error::{DocumentError, Result};
use super::store::{ChangelogDocuments, DocumentHandle};
use crate::index::document_title;
use crate::types::OsKind;

/// Stores `<commit>-<os_kind>.html` files. Reviewers sign off by editing
/// the HTML.
pub struct DryRunDocuments {
    folder: PathBuf,
}

impl DryRunDocuments {
    pub fn new(folder: impl Into<PathBuf>) -> Result<Self> {
        let folder = folder.into();
        std::fs::create_dir_all(&folder).map_err(|e| DocumentError::storage(&folder, e))?;
        Ok(Self { folder })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path_for(&self, release_commit: &str, os_kind: OsKind) -> PathBuf {
        self.folder
            .join(format!("{}-{}.html", release_commit, os_kind))
    }
}

#[async_trait]
impl ChangelogDocuments for DryRunDocuments {
    async fn ensure(
        &self,
        release_tag: &str,
        release_commit: &str,
        os_kind: OsKind,
        content: &str,
    ) -> Result<DocumentHandle> {
        let path = self.path_for(release_commit, os_kind);
        let created = !path.exists();
        if created {
            std::fs::write(&path, markdown_to_html(content))
                .map_err(|e| DocumentError::storage(&path, e))?;
            log::warn!("Stored release notes in {}", path.display());
        }
        Ok(DocumentHandle {
            id: format!("{}-{}", release_commit, os_kind),
            title: document_title(os_kind, release_tag, release_commit),
            url: path.display().to_string(),
            created,
        })
    }

    async fn fetch_markdown(&self, release_commit: &str, os_kind: OsKind) -> Result<Option<String>> {
        let path = self.path_for(release_commit, os_kind);
        if !path.exists() {
            return Ok(None);
        }
        let html = std::fs::read_to_string(&path).map_err(|e| DocumentError::storage(&path, e))?;
        html_to_markdown(&html).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ensure_keeps_existing_document() {
        let tmp = TempDir::new().unwrap();
        let docs = DryRunDocuments::new(tmp.path()).unwrap();
        assert_eq!(docs.fetch_markdown("abc", OsKind::GuestOs).await.unwrap(), None);

        let first = docs
            .ensure("release-x-base", "abc", OsKind::GuestOs, "# Release Notes for x\n")
            .await
            .unwrap();
        assert!(first.created);
        let second = docs
            .ensure("release-x-base", "abc", OsKind::GuestOs, "# Something else\n")
            .await
            .unwrap();
        assert!(!second.created);

        let markdown = docs.fetch_markdown("abc", OsKind::GuestOs).await.unwrap().unwrap();
        assert_eq!(markdown, "# Release Notes for x\n");
        assert!(docs.path_for("abc", OsKind::GuestOs).ends_with("abc-GuestOS.html"));
        assert_eq!(docs.fetch_markdown("abc", OsKind::HostOs).await.unwrap(), None);
    }
}
