//! Test harness: a Git origin, its mirror and dry-run collaborators.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use tempfile::TempDir;

use release_reconciler::annotation::StaticDeterminator;
use release_reconciler::clock::ManualClock;
use release_reconciler::docs::DryRunDocuments;
use release_reconciler::forum::{
    CachedDiscourse, DryRunDiscourse, ForumClient, Post, DEFAULT_CATEGORY_ID, DEFAULT_TOPIC_TTL,
};
use release_reconciler::governance::{DryRunGovernance, StaticPackages};
use release_reconciler::index::StaticIndexSource;
use release_reconciler::mirror::{MirrorSettings, SourceMirror};
use release_reconciler::publish::DryRunPublisher;
use release_reconciler::reconciler::{Collaborators, Reconciler, ReconcilerSettings};
use release_reconciler::state::ReconcilerState;
use release_reconciler::types::{CommitInclusion, OsKind};

use super::builders::IndexBuilder;

pub const NEW_RC: &str = "rc--2025-10-02_03-13";
pub const PREVIOUS_RC: &str = "rc--2025-09-25_09-52";
pub const PACKAGE_CHECKSUM: &str =
    "1111111111111111111111111111111111111111111111111111111111111111";

static CHECKLIST_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<li>(@[^<]+)</li>").unwrap());

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(["-c", "user.name=Ada Lovelace", "-c", "user.email=ada@example.com"])
        .args(args)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn commit_file(dir: &Path, path: &str, content: &str, message: &str) -> String {
    let full = dir.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, content).unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "--quiet", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-10-02T04:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Isolated environment for driving the reconciler pass by pass.
pub struct TestHarness {
    temp_dir: TempDir,
    pub origin: PathBuf,
    pub state_path: PathBuf,
    pub mirror: Arc<SourceMirror>,
    pub index: Arc<StaticIndexSource>,
    pub determinator: Arc<StaticDeterminator>,
    pub forum: Arc<DryRunDiscourse>,
    pub documents: Arc<DryRunDocuments>,
    pub publisher: Arc<DryRunPublisher>,
    pub governance: Arc<DryRunGovernance>,
    pub clock: Arc<ManualClock>,
    /// Base of the previous release.
    pub previous: String,
    /// Commits after `previous` up to and including `release`.
    pub changes: Vec<String>,
    /// Base of the new release.
    pub release: String,
}

impl TestHarness {
    /// An origin with a previous release, three changes and a new release
    /// on top. Nothing is annotated and the index is empty.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let origin = temp_dir.path().join("origin");
        std::fs::create_dir_all(&origin).unwrap();
        git(&origin, &["init", "--quiet", "-b", "master"]);

        let previous = commit_file(
            &origin,
            ".github/CODEOWNERS",
            "* @dfinity/ic-owners-owners\n/rs/execution/ @dfinity/execution\n/rs/sns/ @dfinity/nns-team\n",
            "chore: codeowners",
        );
        let changes = vec![
            commit_file(
                &origin,
                "rs/execution/src/lib.rs",
                "fn main() {}\n",
                "feat(execution): RUN-1: speed up (#42)",
            ),
            commit_file(&origin, "rs/sns/src/lib.rs", "x\n", "fix(sns): swap"),
            commit_file(&origin, "rs/execution/src/b.rs", "y\n", "perf: cache"),
        ];
        let release = changes.last().unwrap().clone();

        let mirror = Arc::new(SourceMirror::new(
            temp_dir.path().join("mirror"),
            MirrorSettings::new(origin.to_string_lossy(), "master"),
        ));
        mirror.fetch().await.expect("Failed to mirror origin");

        let storage = temp_dir.path().join("dry-run");
        Self {
            state_path: temp_dir.path().join("state").join("state.json"),
            mirror,
            index: Arc::new(StaticIndexSource::new("releases: []\n")),
            determinator: Arc::new(StaticDeterminator::new()),
            forum: Arc::new(DryRunDiscourse::in_memory()),
            documents: Arc::new(DryRunDocuments::new(storage.join("documents")).unwrap()),
            publisher: Arc::new(DryRunPublisher::in_memory()),
            governance: Arc::new(DryRunGovernance::in_memory()),
            clock: Arc::new(ManualClock::new(start_time())),
            origin,
            previous,
            changes,
            release,
            temp_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The new release on top of the previous one, base versions only.
    pub fn standard_index(&self) -> String {
        IndexBuilder::new()
            .release(NEW_RC)
            .version("base", &self.release)
            .release(PREVIOUS_RC)
            .version("base", &self.previous)
            .build()
    }

    pub fn set_index(&self, content: &str) {
        self.index.set(content);
    }

    /// Marks commits as changing both OS images.
    pub fn annotate(&self, commits: &[String]) {
        for commit in commits {
            for os_kind in OsKind::ALL {
                self.determinator.set(commit, os_kind, CommitInclusion::Belongs);
            }
        }
    }

    pub fn annotate_changes(&self) {
        self.annotate(&self.changes);
    }

    /// A reconciler as it would start up now, with state read from disk.
    pub fn reconciler(&self) -> Reconciler {
        self.reconciler_with(ReconcilerSettings::default())
    }

    pub fn reconciler_with(&self, settings: ReconcilerSettings) -> Reconciler {
        let api = CachedDiscourse::new(self.forum.clone(), DEFAULT_TOPIC_TTL);
        let collaborators = Collaborators {
            index: self.index.clone(),
            mirror: self.mirror.clone(),
            determinator: self.determinator.clone(),
            forum: ForumClient::new(Arc::new(api), DEFAULT_CATEGORY_ID),
            documents: self.documents.clone(),
            publisher: self.publisher.clone(),
            observer: self.governance.clone(),
            submitter: self.governance.clone(),
            packages: Arc::new(StaticPackages::new(PACKAGE_CHECKSUM)),
            clock: self.clock.clone(),
        };
        let state = ReconcilerState::load(&self.state_path).expect("Failed to load state");
        Reconciler::new(collaborators, state, settings)
    }

    /// Strikes out every reviewer in a change-log document.
    pub fn approve(&self, commit: &str, os_kind: OsKind) {
        let path = self.documents.path_for(commit, os_kind);
        let html = std::fs::read_to_string(&path).expect("Document does not exist");
        let approved = CHECKLIST_ENTRY.replace_all(&html, "<li><del>$1</del></li>");
        assert_ne!(approved, html, "no reviewers to strike out");
        std::fs::write(&path, approved.as_ref()).unwrap();
    }

    pub fn documents_count(&self) -> usize {
        std::fs::read_dir(self.documents.folder())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Replies in the only release topic, in posting order.
    pub fn replies(&self) -> Vec<Post> {
        let topics = self.forum.topics();
        assert!(topics.len() <= 1, "expected at most one topic");
        topics
            .into_iter()
            .flat_map(|t| t.posts.into_iter().skip(1))
            .collect()
    }

    pub fn total_posts(&self) -> usize {
        self.forum.topics().iter().map(|t| t.posts.len()).sum()
    }

    pub fn origin_tags(&self) -> Vec<String> {
        git(&self.origin, &["tag", "--list"])
            .lines()
            .map(str::to_string)
            .collect()
    }
}
