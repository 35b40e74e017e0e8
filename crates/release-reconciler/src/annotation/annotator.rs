//! Computing commit annotations with the build graph.
//!
//! For a commit and an OS kind the annotator checks out the commit, lists the
//! packages the OS image depends on (`bazel query deps(...)`) and asks
//! `target-determinator` whether the image target changed relative to the
//! commit's parent. Both tools mutate the working tree, so they run one after
//! the other under the mirror's worktree lock.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::process::Command as TokioCommand;

use super::determinator::{parse_packages, CommitChangeDeterminator};
use super::error::{AnnotationError, Result};
use crate::mirror::SourceMirror;
use crate::retry::{retry_transient, RetryPolicy};
use crate::types::{CommitInclusion, OsKind};

/// Total time `target-determinator` may spend on retries for one commit.
const TARGET_DETERMINATOR_RETRY_LIMIT: Duration = Duration::from_secs(180);
/// Branches annotated by default.
pub const DEFAULT_BRANCH_GLOBS: [&str; 2] = ["master", "rc--*"];
/// Release branches older than this are not annotated.
pub const DEFAULT_MAX_BRANCH_AGE_DAYS: i64 = 20;

/// Paths and limits for the external build tools.
#[derive(Debug, Clone)]
pub struct AnnotatorSettings {
    pub bazel: PathBuf,
    pub target_determinator: PathBuf,
    pub retry: RetryPolicy,
    /// Stop walking history after this many unannotated commits.
    pub max_plan_depth: usize,
}

impl Default for AnnotatorSettings {
    fn default() -> Self {
        Self {
            bazel: PathBuf::from("bazel"),
            target_determinator: PathBuf::from("target-determinator"),
            retry: RetryPolicy::for_duration(TARGET_DETERMINATOR_RETRY_LIMIT, Duration::from_secs(2)),
            max_plan_depth: 5000,
        }
    }
}

/// The computed verdict for one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub inclusion: CommitInclusion,
    /// Build packages of the OS image at this commit, when the query succeeded.
    pub packages: Option<BTreeSet<String>>,
}

/// Computes annotations and records them as Git notes.
pub struct Annotator {
    mirror: Arc<SourceMirror>,
    settings: AnnotatorSettings,
}

impl Annotator {
    pub fn new(mirror: Arc<SourceMirror>, settings: AnnotatorSettings) -> Self {
        Self { mirror, settings }
    }

    pub fn mirror(&self) -> &SourceMirror {
        &self.mirror
    }

    /// Computes the verdict for `commit` without recording it.
    pub async fn compute(&self, commit: &str, os_kind: OsKind) -> Result<Annotation> {
        if self.mirror.file_changes(commit)?.is_empty() {
            log::debug!("Commit {} changes no files", commit);
            return Ok(Annotation {
                inclusion: CommitInclusion::DoesNotBelong,
                packages: Some(BTreeSet::new()),
            });
        }

        let parent = match self.mirror.parent(commit) {
            Ok(parent) => parent,
            Err(e) => {
                log::warn!("Cannot annotate {} without a parent: {}", commit, e);
                return Ok(Annotation {
                    inclusion: CommitInclusion::Failed,
                    packages: None,
                });
            }
        };

        let worktree = self.mirror.lock_worktree().await;
        worktree.checkout(commit)?;

        let packages = match self.query_dependencies(worktree.path(), os_kind).await {
            Ok(packages) => Some(packages),
            Err(e) => {
                log::warn!("Dependency query for {} ({}) failed: {}", commit, os_kind, e);
                None
            }
        };

        let what = format!("target-determinator for {}", commit);
        let path = worktree.path();
        let parent = parent.as_str();
        let inclusion = match retry_transient(self.settings.retry, &what, || {
            self.target_changed(path, parent, os_kind)
        })
        .await
        {
            Ok(true) => CommitInclusion::Belongs,
            Ok(false) => CommitInclusion::DoesNotBelong,
            Err(e) => {
                log::error!("Could not annotate {} for {}: {}", commit, os_kind, e);
                CommitInclusion::Failed
            }
        };

        Ok(Annotation {
            inclusion,
            packages,
        })
    }

    /// Stores an annotation as notes in the local mirror.
    pub fn record(&self, commit: &str, os_kind: OsKind, annotation: &Annotation) -> Result<()> {
        if let Some(packages) = &annotation.packages {
            let listing = packages.iter().cloned().collect::<Vec<_>>().join("\n");
            self.mirror
                .notes_add(os_kind.targets_notes_namespace(), commit, &listing)?;
        }
        self.mirror.notes_add(
            os_kind.changed_notes_namespace(),
            commit,
            annotation.inclusion.as_note(),
        )?;
        Ok(())
    }

    /// Pushes the notes namespaces of `os_kind` that exist locally.
    pub async fn push(&self, os_kind: OsKind) -> Result<()> {
        for namespace in [
            os_kind.changed_notes_namespace(),
            os_kind.targets_notes_namespace(),
        ] {
            let reference = format!("refs/notes/{}", namespace);
            if self.mirror.resolve(&reference)?.is_some() {
                self.mirror.push_notes(namespace).await?;
            }
        }
        Ok(())
    }

    /// Unannotated commits on `branch`, oldest first.
    ///
    /// Walks first parents from the branch tip until an annotated commit (or
    /// the root) is reached.
    pub fn plan_branch(&self, branch: &str, os_kind: OsKind) -> Result<Vec<String>> {
        let tip = format!("origin/{}", branch);
        let Some(mut current) = self.mirror.resolve(&tip)? else {
            return Ok(Vec::new());
        };

        let namespace = os_kind.changed_notes_namespace();
        let mut pending = Vec::new();
        while self.mirror.notes_show(namespace, &current)?.is_none() {
            pending.push(current.clone());
            if pending.len() >= self.settings.max_plan_depth {
                log::warn!(
                    "Branch {} has more than {} unannotated commits; annotating the newest only",
                    branch,
                    self.settings.max_plan_depth
                );
                break;
            }
            match self.mirror.parent(&current) {
                Ok(parent) => current = parent,
                Err(_) => break,
            }
        }

        pending.reverse();
        if !pending.is_empty() {
            log::info!("Branch {} has {} commits to annotate", branch, pending.len());
        }
        Ok(pending)
    }

    /// Annotates every matching branch for every OS kind and pushes the notes.
    ///
    /// Returns the number of commits annotated.
    pub async fn annotate_branches(
        &self,
        globs: &[&str],
        max_age_days: i64,
        now: DateTime<Utc>,
        os_kinds: &[OsKind],
    ) -> Result<usize> {
        self.mirror.fetch().await?;

        let mut branches = Vec::new();
        for glob in globs {
            for branch in self.mirror.remote_branches(glob)? {
                let is_direct = !glob.contains('*');
                if !is_direct && !branch_is_recent(&branch, max_age_days, now) {
                    log::debug!("Ignoring branch older than {} days: {}", max_age_days, branch);
                    continue;
                }
                if !branches.contains(&branch) {
                    branches.push(branch);
                }
            }
        }

        let mut annotated = 0;
        for &os_kind in os_kinds {
            let mut done: HashSet<String> = HashSet::new();
            for branch in &branches {
                let plan = self.plan_branch(branch, os_kind)?;
                for commit in plan {
                    if done.contains(&commit) {
                        continue;
                    }
                    let annotation = self.compute(&commit, os_kind).await?;
                    self.record(&commit, os_kind, &annotation)?;
                    done.insert(commit);
                    annotated += 1;
                }
            }
            if !done.is_empty() {
                self.push(os_kind).await?;
            }
        }

        Ok(annotated)
    }

    async fn query_dependencies(&self, cwd: &Path, os_kind: OsKind) -> Result<BTreeSet<String>> {
        let expression = format!("deps({})", os_kind.target_expression());
        let stdout = run_tool(&self.settings.bazel, cwd, &["query", &expression]).await?;
        Ok(parse_packages(&stdout))
    }

    async fn target_changed(&self, cwd: &Path, parent: &str, os_kind: OsKind) -> Result<bool> {
        let bazel_flag = format!("-bazel={}", self.settings.bazel.display());
        let stdout = run_tool(
            &self.settings.target_determinator,
            cwd,
            &[
                "-before-query-error-behavior=fatal",
                &bazel_flag,
                "--targets",
                os_kind.target_expression(),
                parent,
            ],
        )
        .await?;
        log::debug!("target-determinator output for {}: {}", parent, stdout);
        Ok(!stdout.trim().is_empty())
    }
}

async fn run_tool(program: &Path, cwd: &Path, args: &[&str]) -> Result<String> {
    let tool = program.display().to_string();
    let output = TokioCommand::new(program)
        .current_dir(cwd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| AnnotationError::tool(&tool, e.to_string()))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(AnnotationError::tool(
            &tool,
            format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ))
    }
}

/// Whether an `rc--YYYY-MM-DD...` branch is at most `max_age_days` old.
pub fn branch_is_recent(branch: &str, max_age_days: i64, now: DateTime<Utc>) -> bool {
    let Some(rest) = branch.strip_prefix("rc--") else {
        return false;
    };
    let Some(date) = rest.get(..10) else {
        return false;
    };
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(date) => (now.date_naive() - date).num_days() <= max_age_days,
        Err(_) => false,
    }
}

/// Computes verdicts on demand and never writes notes.
pub struct RecomputingDeterminator {
    annotator: Annotator,
}

impl RecomputingDeterminator {
    pub fn new(annotator: Annotator) -> Self {
        Self { annotator }
    }
}

#[async_trait]
impl CommitChangeDeterminator for RecomputingDeterminator {
    async fn classify(&self, commit: &str, os_kind: OsKind) -> Result<CommitInclusion> {
        Ok(self.annotator.compute(commit, os_kind).await?.inclusion)
    }

    async fn dependency_packages(
        &self,
        commit: &str,
        os_kind: OsKind,
    ) -> Result<Option<BTreeSet<String>>> {
        Ok(self.annotator.compute(commit, os_kind).await?.packages)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::mirror::MirrorSettings;
    use chrono::TimeZone;
    use std::os::unix::fs::PermissionsExt;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .current_dir(dir)
            .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
            .args(args)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {:?} failed", args);
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn commit_file(dir: &Path, path: &str, content: &str) -> String {
        let full = dir.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "--quiet", "-m", &format!("chore: touch {}", path)]);
        git(dir, &["rev-parse", "HEAD"])
    }

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    struct Fixture {
        _tmp: TempDir,
        origin: PathBuf,
        annotator: Annotator,
    }

    /// Fake tools: bazel lists two packages; target-determinator reports a
    /// change only when the checkout contains `rs/` sources.
    async fn fixture(retry: RetryPolicy) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let origin = tmp.path().join("origin");
        std::fs::create_dir_all(&origin).unwrap();
        git(&origin, &["init", "--quiet", "-b", "master"]);
        commit_file(&origin, "README.md", "hi\n");

        let bazel = script(
            tmp.path(),
            "bazel",
            "echo '//rs/execution:lib'\necho '@crate_index//:serde'\necho '//ic-os/guestos:img'",
        );
        let td = script(
            tmp.path(),
            "target-determinator",
            "if [ -d rs ]; then echo '//ic-os/guestos/envs/prod:update-img.tar.zst'; fi",
        );

        let settings = MirrorSettings::new(origin.to_string_lossy(), "master");
        let mirror = Arc::new(SourceMirror::new(tmp.path().join("mirror"), settings));
        mirror.fetch().await.unwrap();

        let annotator = Annotator::new(
            mirror,
            AnnotatorSettings {
                bazel,
                target_determinator: td,
                retry,
                max_plan_depth: 100,
            },
        );
        Fixture {
            _tmp: tmp,
            origin,
            annotator,
        }
    }

    #[test]
    fn test_branch_age() {
        let now = Utc.with_ymd_and_hms(2025, 10, 10, 0, 0, 0).unwrap();
        assert!(branch_is_recent("rc--2025-10-02_03-13", 20, now));
        assert!(!branch_is_recent("rc--2025-09-01_03-13", 20, now));
        assert!(!branch_is_recent("feature", 20, now));
    }

    #[tokio::test]
    async fn test_compute_belongs_and_lists_packages() {
        let fx = fixture(RetryPolicy::none()).await;
        let commit = commit_file(&fx.origin, "rs/execution/src/lib.rs", "fn x() {}\n");
        fx.annotator.mirror().fetch().await.unwrap();

        let annotation = fx.annotator.compute(&commit, OsKind::GuestOs).await.unwrap();
        assert_eq!(annotation.inclusion, CommitInclusion::Belongs);
        let packages = annotation.packages.unwrap();
        assert!(packages.contains("//rs/execution:lib"));
        assert!(!packages.iter().any(|p| p.starts_with('@')));
    }

    #[tokio::test]
    async fn test_failing_tool_yields_failed() {
        let fx = fixture(RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_elapsed: None,
        })
        .await;
        let broken = script(fx._tmp.path(), "broken-td", "echo boom >&2\nexit 3");
        let annotator = Annotator::new(
            Arc::clone(&fx.annotator.mirror),
            AnnotatorSettings {
                target_determinator: broken,
                ..fx.annotator.settings.clone()
            },
        );
        let commit = commit_file(&fx.origin, "rs/x.rs", "x\n");
        annotator.mirror().fetch().await.unwrap();

        let annotation = annotator.compute(&commit, OsKind::GuestOs).await.unwrap();
        assert_eq!(annotation.inclusion, CommitInclusion::Failed);
    }

    #[tokio::test]
    async fn test_plan_record_and_push() {
        let fx = fixture(RetryPolicy::none()).await;
        let first = git(&fx.origin, &["rev-parse", "HEAD"]);
        let second = commit_file(&fx.origin, "docs/a.md", "a\n");
        let third = commit_file(&fx.origin, "rs/b.rs", "b\n");
        fx.annotator.mirror().fetch().await.unwrap();

        let plan = fx.annotator.plan_branch("master", OsKind::GuestOs).unwrap();
        assert_eq!(plan, vec![first.clone(), second.clone(), third.clone()]);

        let now = Utc::now();
        let count = fx
            .annotator
            .annotate_branches(&DEFAULT_BRANCH_GLOBS, DEFAULT_MAX_BRANCH_AGE_DAYS, now, &[OsKind::GuestOs])
            .await
            .unwrap();
        assert_eq!(count, 3);
        assert!(fx.annotator.plan_branch("master", OsKind::GuestOs).unwrap().is_empty());

        let note = git(&fx.origin, &["notes", "--ref=guestos-changed", "show", &second]);
        assert_eq!(note, "False");
        let note = git(&fx.origin, &["notes", "--ref=guestos-changed", "show", &third]);
        assert_eq!(note, "True");
    }

    #[tokio::test]
    async fn test_shared_history_is_annotated_once() {
        let fx = fixture(RetryPolicy::none()).await;
        commit_file(&fx.origin, "rs/a.rs", "a\n");
        git(&fx.origin, &["checkout", "--quiet", "-b", "rc--2025-10-02_03-13"]);
        let rc_only = commit_file(&fx.origin, "rs/rc.rs", "rc\n");
        git(&fx.origin, &["checkout", "--quiet", "master"]);

        let now = Utc.with_ymd_and_hms(2025, 10, 10, 0, 0, 0).unwrap();
        let count = fx
            .annotator
            .annotate_branches(&DEFAULT_BRANCH_GLOBS, DEFAULT_MAX_BRANCH_AGE_DAYS, now, &[OsKind::GuestOs])
            .await
            .unwrap();
        assert_eq!(count, 3);
        assert!(fx
            .annotator
            .plan_branch("rc--2025-10-02_03-13", OsKind::GuestOs)
            .unwrap()
            .is_empty());
        let note = git(&fx.origin, &["notes", "--ref=guestos-changed", "show", &rc_only]);
        assert_eq!(note, "True");
    }

    #[tokio::test]
    async fn test_recomputing_determinator() {
        let fx = fixture(RetryPolicy::none()).await;
        let commit = commit_file(&fx.origin, "docs/only.md", "d\n");
        fx.annotator.mirror().fetch().await.unwrap();
        let mirror = Arc::clone(&fx.annotator.mirror);
        let det = RecomputingDeterminator::new(fx.annotator);

        assert_eq!(
            det.classify(&commit, OsKind::HostOs).await.unwrap(),
            CommitInclusion::DoesNotBelong
        );
        assert!(mirror.notes_show("hostos-changed", &commit).unwrap().is_none());
    }
}
