//! The change-log document store interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::Result;
use crate::types::OsKind;

/// A stored change-log document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    pub id: String,
    pub title: String,
    /// Where reviewers open the document.
    pub url: String,
    /// Whether this call created the document.
    pub created: bool,
}

/// Whether a stored title belongs to `release_commit` and `os_kind`.
pub fn title_matches(title: &str, release_commit: &str, os_kind: OsKind) -> bool {
    title.contains(release_commit) && title.contains(os_kind.as_str())
}

/// Editable change-log documents reviewers sign off in.
#[async_trait]
pub trait ChangelogDocuments: Send + Sync {
    /// Returns the existing document for the commit and OS kind unchanged, or
    /// creates it from `content` (Markdown).
    async fn ensure(
        &self,
        release_tag: &str,
        release_commit: &str,
        os_kind: OsKind,
        content: &str,
    ) -> Result<DocumentHandle>;

    /// Latest revision of the document as Markdown, if the document exists.
    async fn fetch_markdown(&self, release_commit: &str, os_kind: OsKind) -> Result<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::document_title;

    #[test]
    fn test_title_matching_needs_commit_and_os() {
        let title = document_title(OsKind::HostOs, "release-2025-10-02_03-13-base", "abc");
        assert!(title_matches(&title, "abc", OsKind::HostOs));
        assert!(!title_matches(&title, "abc", OsKind::GuestOs));
        assert!(!title_matches(&title, "abd", OsKind::HostOs));
    }
}
