//! Loading and validating the release index.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::{IndexError, Result};
use super::model::{Release, ReleaseIndex};
use crate::mirror::SourceMirror;

/// File name of the index at the root of the index repository.
pub const RELEASE_INDEX_FILE: &str = "release-index.yaml";

/// A release that failed validation and is ignored for this pass.
#[derive(Debug)]
pub struct RejectedRelease {
    pub rc_name: String,
    pub error: IndexError,
}

/// Result of lenient loading: the valid part of the index plus what was dropped.
#[derive(Debug, Default)]
pub struct LoadedIndex {
    pub index: ReleaseIndex,
    pub rejected: Vec<RejectedRelease>,
}

/// Parses an index and rejects it entirely if any release is invalid.
pub fn parse_release_index(content: &str) -> Result<ReleaseIndex> {
    let index: ReleaseIndex = serde_yaml::from_str(content)?;

    let mut previous: Option<&Release> = None;
    for release in &index.releases {
        validate_release(release)?;
        if let Some(prev) = previous {
            check_descending(prev, release)?;
        }
        previous = Some(release);
    }

    Ok(index)
}

/// Parses an index, keeping every valid release and reporting the others.
///
/// A release that is out of order relative to the last accepted release is
/// rejected; the releases after it are still considered.
pub fn parse_release_index_lenient(content: &str) -> Result<LoadedIndex> {
    let raw: ReleaseIndex = serde_yaml::from_str(content)?;

    let mut loaded = LoadedIndex::default();
    for release in raw.releases {
        let verdict = validate_release(&release).and_then(|_| {
            match loaded.index.releases.last() {
                Some(prev) => check_descending(prev, &release),
                None => Ok(()),
            }
        });

        match verdict {
            Ok(()) => loaded.index.releases.push(release),
            Err(error) => {
                log::warn!("Ignoring invalid release {}: {}", release.rc_name, error);
                loaded.rejected.push(RejectedRelease {
                    rc_name: release.rc_name,
                    error,
                });
            }
        }
    }

    Ok(loaded)
}

/// Checks the per-release invariants: name format, unique names, one base, commit ids.
pub fn validate_release(release: &Release) -> Result<()> {
    if release.timestamp().is_none() {
        return Err(IndexError::InvalidRcName(release.rc_name.clone()));
    }
    if release.versions.is_empty() {
        return Err(IndexError::EmptyRelease {
            rc_name: release.rc_name.clone(),
        });
    }

    let mut seen = HashSet::new();
    for version in &release.versions {
        if !seen.insert(version.name.as_str()) {
            return Err(IndexError::DuplicateName {
                rc_name: release.rc_name.clone(),
                name: version.name.clone(),
            });
        }
        if !is_commit_id(&version.version) {
            return Err(IndexError::InvalidCommit {
                rc_name: release.rc_name.clone(),
                name: version.name.clone(),
                commit: version.version.clone(),
            });
        }
    }

    let bases = release.versions.iter().filter(|v| v.is_base()).count();
    if bases != 1 {
        return Err(IndexError::MissingBase {
            rc_name: release.rc_name.clone(),
            found: bases,
        });
    }

    Ok(())
}

fn check_descending(previous: &Release, release: &Release) -> Result<()> {
    match (previous.timestamp(), release.timestamp()) {
        (Some(prev), Some(current)) if current < prev => Ok(()),
        _ => Err(IndexError::NotDescending {
            rc_name: release.rc_name.clone(),
            previous: previous.rc_name.clone(),
        }),
    }
}

/// Full, lowercase, 40-character hexadecimal commit id.
pub fn is_commit_id(value: &str) -> bool {
    value.len() == 40 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Where the release index comes from.
#[async_trait]
pub trait ReleaseIndexSource: Send + Sync {
    /// Returns the current raw index document.
    async fn read(&self) -> Result<String>;

    /// Loads the index, failing if any release is invalid.
    async fn load(&self) -> Result<ReleaseIndex> {
        parse_release_index(&self.read().await?)
    }

    /// Loads the index, dropping invalid releases.
    async fn load_lenient(&self) -> Result<LoadedIndex> {
        parse_release_index_lenient(&self.read().await?)
    }
}

/// An index held in memory. Useful for tests and one-off runs.
pub struct StaticIndexSource {
    content: std::sync::RwLock<String>,
}

impl StaticIndexSource {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: std::sync::RwLock::new(content.into()),
        }
    }

    /// Replaces the served document.
    pub fn set(&self, content: impl Into<String>) {
        if let Ok(mut guard) = self.content.write() {
            *guard = content.into();
        }
    }
}

#[async_trait]
impl ReleaseIndexSource for StaticIndexSource {
    async fn read(&self) -> Result<String> {
        Ok(self
            .content
            .read()
            .map(|c| c.clone())
            .unwrap_or_default())
    }
}

/// An index read from a local file on every load.
pub struct FileIndexSource {
    path: PathBuf,
}

impl FileIndexSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReleaseIndexSource for FileIndexSource {
    async fn read(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| IndexError::ReadFile {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }
}

/// An index kept in a Git repository; every load fetches first.
pub struct GitIndexSource {
    mirror: Arc<SourceMirror>,
}

impl GitIndexSource {
    pub fn new(mirror: Arc<SourceMirror>) -> Self {
        Self { mirror }
    }

    pub fn mirror(&self) -> &SourceMirror {
        &self.mirror
    }
}

#[async_trait]
impl ReleaseIndexSource for GitIndexSource {
    async fn read(&self) -> Result<String> {
        self.mirror.fetch().await?;

        let worktree = self.mirror.lock_worktree().await;
        worktree.reset_to_main()?;
        let path = worktree.path().join(RELEASE_INDEX_FILE);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| IndexError::ReadFile {
                path,
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(c: char) -> String {
        c.to_string().repeat(40)
    }

    fn index_yaml(releases: &[(&str, &[(&str, String)])]) -> String {
        let mut out = String::from("releases:\n");
        for (rc, versions) in releases {
            out.push_str(&format!("  - rc_name: {}\n    versions:\n", rc));
            for (name, version) in *versions {
                out.push_str(&format!("      - name: {}\n        version: {}\n", name, version));
            }
        }
        out
    }

    #[test]
    fn test_parse_valid_index() {
        let yaml = index_yaml(&[
            ("rc--2025-10-02_03-13", &[("base", sha('a')), ("hotfix", sha('b'))]),
            ("rc--2025-09-25_09-52", &[("base", sha('c'))]),
        ]);
        let index = parse_release_index(&yaml).unwrap();
        assert_eq!(index.releases.len(), 2);
        assert_eq!(index.releases[0].versions[1].name, "hotfix");
    }

    #[test]
    fn test_empty_index_is_valid() {
        assert!(parse_release_index("releases: []\n").unwrap().releases.is_empty());
        assert!(parse_release_index("{}\n").unwrap().releases.is_empty());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let yaml = index_yaml(&[("rc--2025-10-02_03-13", &[("base", sha('a')), ("base", sha('b'))])]);
        assert!(matches!(
            parse_release_index(&yaml),
            Err(IndexError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_rejects_missing_base() {
        let yaml = index_yaml(&[("rc--2025-10-02_03-13", &[("feat", sha('a'))])]);
        assert!(matches!(
            parse_release_index(&yaml),
            Err(IndexError::MissingBase { found: 0, .. })
        ));
    }

    #[test]
    fn test_rejects_non_descending_dates() {
        let yaml = index_yaml(&[
            ("rc--2025-09-25_09-52", &[("base", sha('a'))]),
            ("rc--2025-10-02_03-13", &[("base", sha('b'))]),
        ]);
        assert!(matches!(
            parse_release_index(&yaml),
            Err(IndexError::NotDescending { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_commit_ids() {
        let bad_ids = ["abc".to_string(), "A".repeat(40), "g".repeat(40)];
        for bad in &bad_ids {
            let yaml = index_yaml(&[("rc--2025-10-02_03-13", &[("base", bad.clone())])]);
            assert!(matches!(
                parse_release_index(&yaml),
                Err(IndexError::InvalidCommit { .. })
            ));
        }
    }

    #[test]
    fn test_lenient_keeps_valid_releases() {
        let yaml = index_yaml(&[
            ("rc--2025-10-09_03-13", &[("base", sha('a'))]),
            ("rc--2025-10-02_03-13", &[("feat", sha('b'))]),
            ("rc--2025-09-25_09-52", &[("base", sha('c'))]),
        ]);
        let loaded = parse_release_index_lenient(&yaml).unwrap();
        let names: Vec<_> = loaded.index.releases.iter().map(|r| r.rc_name.as_str()).collect();
        assert_eq!(names, vec!["rc--2025-10-09_03-13", "rc--2025-09-25_09-52"]);
        assert_eq!(loaded.rejected.len(), 1);
        assert_eq!(loaded.rejected[0].rc_name, "rc--2025-10-02_03-13");
    }

    #[test]
    fn test_lenient_still_fails_on_malformed_yaml() {
        assert!(matches!(
            parse_release_index_lenient("releases: [oops"),
            Err(IndexError::ParseYaml(_))
        ));
    }

    #[tokio::test]
    async fn test_static_source_can_be_replaced() {
        let source = StaticIndexSource::new("releases: []\n");
        assert!(source.load().await.unwrap().releases.is_empty());

        source.set(index_yaml(&[("rc--2025-10-02_03-13", &[("base", sha('a'))])]));
        assert_eq!(source.load().await.unwrap().releases.len(), 1);
    }

    #[tokio::test]
    async fn test_file_source_reports_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = FileIndexSource::new(tmp.path().join(RELEASE_INDEX_FILE));
        assert!(matches!(
            source.load().await,
            Err(IndexError::ReadFile { .. })
        ));

        std::fs::write(
            tmp.path().join(RELEASE_INDEX_FILE),
            index_yaml(&[("rc--2025-10-02_03-13", &[("base", sha('a'))])]),
        )
        .unwrap();
        assert_eq!(source.load().await.unwrap().releases.len(), 1);
    }
}
