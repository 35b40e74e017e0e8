//! Builds the release-notes Markdown for a release.

use std::sync::Arc;

use log::{debug, info};

use super::change::{describe_change, Change};
use super::error::{NotesError, Result};
use super::facts::gather_facts;
use super::render::{render_ordinary, render_security, NotesHeader};
use crate::annotation::CommitChangeDeterminator;
use crate::mirror::SourceMirror;
use crate::types::{CommitInclusion, OsKind};

/// What to compose notes for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseNotesRequest {
    /// Changes since the previous release.
    Ordinary {
        release_tag: String,
        release_commit: String,
        base_tag: String,
        base_commit: String,
        os_kind: OsKind,
    },
    /// Notes are withheld; only the disclosure caveat is published.
    Security {
        release_tag: String,
        release_commit: String,
        os_kind: OsKind,
    },
}

impl ReleaseNotesRequest {
    pub fn os_kind(&self) -> OsKind {
        match self {
            Self::Ordinary { os_kind, .. } | Self::Security { os_kind, .. } => *os_kind,
        }
    }

    pub fn release_commit(&self) -> &str {
        match self {
            Self::Ordinary { release_commit, .. } | Self::Security { release_commit, .. } => {
                release_commit
            }
        }
    }
}

pub struct ReleaseNotesComposer {
    mirror: Arc<SourceMirror>,
    determinator: Arc<dyn CommitChangeDeterminator>,
}

impl ReleaseNotesComposer {
    pub fn new(
        mirror: Arc<SourceMirror>,
        determinator: Arc<dyn CommitChangeDeterminator>,
    ) -> Self {
        Self {
            mirror,
            determinator,
        }
    }

    /// Composes Markdown notes.
    ///
    /// Fails with a not-ready annotation error while any commit in the range
    /// lacks a verdict.
    pub async fn compose(&self, request: &ReleaseNotesRequest) -> Result<String> {
        match request {
            ReleaseNotesRequest::Security {
                release_tag,
                release_commit,
                ..
            } => Ok(render_security(release_tag, release_commit)),
            ReleaseNotesRequest::Ordinary {
                release_tag,
                release_commit,
                base_tag,
                base_commit,
                os_kind,
            } => {
                let changes = self.describe_range(base_commit, release_commit, *os_kind).await?;
                let merge_base = self.mirror.merge_base(base_commit, release_commit)?;
                let header = NotesHeader {
                    release_tag,
                    release_commit,
                    base_tag,
                    base_commit,
                    merge_base: &merge_base,
                    os_kind: *os_kind,
                };
                Ok(render_ordinary(&header, &changes))
            }
        }
    }

    /// Describes every non-merge commit in `(base_commit, release_commit]`.
    pub async fn describe_range(
        &self,
        base_commit: &str,
        release_commit: &str,
        os_kind: OsKind,
    ) -> Result<Vec<Change>> {
        if self.mirror.resolve(release_commit)?.is_none() {
            return Err(NotesError::UnknownCommit(release_commit.to_string()));
        }

        let commits = self.mirror.commits_between(base_commit, release_commit)?;
        info!(
            "Composing {} notes for {} over {} commits",
            os_kind,
            release_commit,
            commits.len()
        );
        let mirror = Arc::clone(&self.mirror);
        let head = release_commit.to_string();
        let facts =
            tokio::task::spawn_blocking(move || gather_facts(&mirror, &commits, &head)).await??;

        let packages = self
            .determinator
            .dependency_packages(release_commit, os_kind)
            .await?;

        let mut changes = Vec::with_capacity(facts.len());
        for fact in &facts {
            let inclusion = if fact.file_changes.is_empty() {
                CommitInclusion::DoesNotBelong
            } else {
                self.determinator.classify(&fact.commit, os_kind).await?
            };
            debug!("{} {:?} for {}", fact.commit, inclusion, os_kind);
            changes.push(describe_change(fact, inclusion, packages.as_ref(), os_kind));
        }
        Ok(changes)
    }
}
