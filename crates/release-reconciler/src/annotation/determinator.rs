//! The commit-change determinator interface and its note-backed implementations.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::error::{AnnotationError, Result};
use crate::mirror::SourceMirror;
use crate::types::{CommitInclusion, OsKind};

/// Decides whether a commit changes the artifact of an OS kind.
#[async_trait]
pub trait CommitChangeDeterminator: Send + Sync {
    /// Classifies `commit`. Returns [`AnnotationError::NotReady`] when no
    /// verdict is available yet.
    async fn classify(&self, commit: &str, os_kind: OsKind) -> Result<CommitInclusion>;

    /// Build-graph packages the artifact depends on at `commit`, if known.
    async fn dependency_packages(
        &self,
        _commit: &str,
        _os_kind: OsKind,
    ) -> Result<Option<BTreeSet<String>>> {
        Ok(None)
    }
}

/// Parses a dependency listing (one label per line).
pub fn parse_packages(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('@'))
        .map(str::to_string)
        .collect()
}

pub(crate) fn parse_verdict(commit: &str, namespace: &str, content: &str) -> Result<CommitInclusion> {
    CommitInclusion::from_note(content).ok_or_else(|| AnnotationError::UnexpectedNote {
        commit: commit.to_string(),
        namespace: namespace.to_string(),
        content: content.trim().to_string(),
    })
}

/// Reads verdicts from the notes of a local mirror. Never computes.
///
/// Notes arrive with every mirror fetch.
pub struct LocalNotesDeterminator {
    mirror: Arc<SourceMirror>,
}

impl LocalNotesDeterminator {
    pub fn new(mirror: Arc<SourceMirror>) -> Self {
        Self { mirror }
    }
}

#[async_trait]
impl CommitChangeDeterminator for LocalNotesDeterminator {
    async fn classify(&self, commit: &str, os_kind: OsKind) -> Result<CommitInclusion> {
        let namespace = os_kind.changed_notes_namespace();
        match self.mirror.notes_show(namespace, commit)? {
            Some(content) => parse_verdict(commit, namespace, &content),
            None => Err(AnnotationError::NotReady {
                commit: commit.to_string(),
                os_kind,
            }),
        }
    }

    async fn dependency_packages(
        &self,
        commit: &str,
        os_kind: OsKind,
    ) -> Result<Option<BTreeSet<String>>> {
        Ok(self
            .mirror
            .notes_show(os_kind.targets_notes_namespace(), commit)?
            .map(|content| parse_packages(&content)))
    }
}

/// Remembers every verdict and package listing it has seen.
///
/// `NotReady` and errors are not remembered so the next call asks again.
pub struct MemoizingDeterminator {
    inner: Arc<dyn CommitChangeDeterminator>,
    verdicts: Mutex<HashMap<(String, OsKind), CommitInclusion>>,
    packages: Mutex<HashMap<(String, OsKind), Option<BTreeSet<String>>>>,
}

impl MemoizingDeterminator {
    pub fn new(inner: Arc<dyn CommitChangeDeterminator>) -> Self {
        Self {
            inner,
            verdicts: Mutex::new(HashMap::new()),
            packages: Mutex::new(HashMap::new()),
        }
    }

    fn cached_verdict(&self, key: &(String, OsKind)) -> Option<CommitInclusion> {
        self.verdicts.lock().ok()?.get(key).copied()
    }
}

#[async_trait]
impl CommitChangeDeterminator for MemoizingDeterminator {
    async fn classify(&self, commit: &str, os_kind: OsKind) -> Result<CommitInclusion> {
        let key = (commit.to_string(), os_kind);
        if let Some(verdict) = self.cached_verdict(&key) {
            return Ok(verdict);
        }

        let verdict = self.inner.classify(commit, os_kind).await?;
        if let Ok(mut verdicts) = self.verdicts.lock() {
            // keep the first answer if another caller raced us
            return Ok(*verdicts.entry(key).or_insert(verdict));
        }
        Ok(verdict)
    }

    async fn dependency_packages(
        &self,
        commit: &str,
        os_kind: OsKind,
    ) -> Result<Option<BTreeSet<String>>> {
        let key = (commit.to_string(), os_kind);
        if let Some(cached) = self.packages.lock().ok().and_then(|p| p.get(&key).cloned()) {
            return Ok(cached);
        }

        let packages = self.inner.dependency_packages(commit, os_kind).await?;
        if packages.is_some() {
            if let Ok(mut cache) = self.packages.lock() {
                cache.insert(key, packages.clone());
            }
        }
        Ok(packages)
    }
}

/// Verdicts held in memory. Commits without a verdict are `NotReady`.
#[derive(Default)]
pub struct StaticDeterminator {
    verdicts: Mutex<HashMap<(String, OsKind), CommitInclusion>>,
    packages: Mutex<HashMap<(String, OsKind), BTreeSet<String>>>,
}

impl StaticDeterminator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, commit: &str, os_kind: OsKind, verdict: CommitInclusion) {
        if let Ok(mut verdicts) = self.verdicts.lock() {
            verdicts.insert((commit.to_string(), os_kind), verdict);
        }
    }

    pub fn set_packages(&self, commit: &str, os_kind: OsKind, packages: BTreeSet<String>) {
        if let Ok(mut map) = self.packages.lock() {
            map.insert((commit.to_string(), os_kind), packages);
        }
    }
}

#[async_trait]
impl CommitChangeDeterminator for StaticDeterminator {
    async fn classify(&self, commit: &str, os_kind: OsKind) -> Result<CommitInclusion> {
        self.verdicts
            .lock()
            .ok()
            .and_then(|v| v.get(&(commit.to_string(), os_kind)).copied())
            .ok_or_else(|| AnnotationError::NotReady {
                commit: commit.to_string(),
                os_kind,
            })
    }

    async fn dependency_packages(
        &self,
        commit: &str,
        os_kind: OsKind,
    ) -> Result<Option<BTreeSet<String>>> {
        Ok(self
            .packages
            .lock()
            .ok()
            .and_then(|p| p.get(&(commit.to_string(), os_kind)).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDeterminator {
        calls: AtomicUsize,
        ready: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl CommitChangeDeterminator for CountingDeterminator {
        async fn classify(&self, commit: &str, os_kind: OsKind) -> Result<CommitInclusion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ready.load(Ordering::SeqCst) {
                Ok(CommitInclusion::Belongs)
            } else {
                Err(AnnotationError::NotReady {
                    commit: commit.to_string(),
                    os_kind,
                })
            }
        }
    }

    #[test]
    fn test_parse_packages_drops_external_labels() {
        let packages = parse_packages("//rs/execution:lib\n@crate_index//:serde\n\n//ic-os/guestos:img\n");
        assert_eq!(
            packages.into_iter().collect::<Vec<_>>(),
            vec!["//ic-os/guestos:img".to_string(), "//rs/execution:lib".to_string()]
        );
    }

    #[test]
    fn test_parse_verdict_rejects_garbage() {
        assert!(matches!(
            parse_verdict("c", "guestos-changed", "yes"),
            Err(AnnotationError::UnexpectedNote { .. })
        ));
        assert_eq!(
            parse_verdict("c", "guestos-changed", "False\n").unwrap(),
            CommitInclusion::DoesNotBelong
        );
    }

    #[tokio::test]
    async fn test_memoizer_caches_verdicts_but_not_not_ready() {
        let inner = Arc::new(CountingDeterminator {
            calls: AtomicUsize::new(0),
            ready: std::sync::atomic::AtomicBool::new(false),
        });
        let memo = MemoizingDeterminator::new(inner.clone());

        assert!(memo.classify("a", OsKind::GuestOs).await.unwrap_err().is_not_ready());
        assert!(memo.classify("a", OsKind::GuestOs).await.unwrap_err().is_not_ready());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);

        inner.ready.store(true, Ordering::SeqCst);
        let first = memo.classify("a", OsKind::GuestOs).await.unwrap();
        let second = memo.classify("a", OsKind::GuestOs).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);

        memo.classify("a", OsKind::HostOs).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_static_determinator() {
        let det = StaticDeterminator::new();
        assert!(det.classify("a", OsKind::GuestOs).await.unwrap_err().is_not_ready());
        det.set("a", OsKind::GuestOs, CommitInclusion::Failed);
        assert_eq!(
            det.classify("a", OsKind::GuestOs).await.unwrap(),
            CommitInclusion::Failed
        );
        assert!(det.dependency_packages("a", OsKind::GuestOs).await.unwrap().is_none());
    }
}
