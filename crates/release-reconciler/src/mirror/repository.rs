//! Local clone of a monitored repository.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tokio::process::Command as TokioCommand;
use tokio::sync::{Mutex, MutexGuard};

use super::auth::build_auth_env;
use super::error::{classify_git_error, MirrorError, Result};
use super::parse::{
    format_git_error, non_empty_lines, parse_ls_remote, parse_numstat, parse_remote_branches,
};
use super::types::{FileChange, MirrorSettings, TagOutcome};

const REMOTE: &str = "origin";

/// A local clone of a remote repository.
///
/// Read-only accessors work on Git's object store and may run concurrently.
/// Anything that touches the working tree goes through [`SourceMirror::lock_worktree`].
pub struct SourceMirror {
    repo_path: PathBuf,
    settings: MirrorSettings,
    worktree_lock: Mutex<()>,
}

/// Exclusive access to the mirror's working tree.
pub struct WorktreeGuard<'a> {
    mirror: &'a SourceMirror,
    _guard: MutexGuard<'a, ()>,
}

impl SourceMirror {
    pub fn new(repo_path: impl Into<PathBuf>, settings: MirrorSettings) -> Self {
        Self {
            repo_path: repo_path.into(),
            settings,
            worktree_lock: Mutex::new(()),
        }
    }

    /// Creates a mirror under `cache_root`, in a directory derived from the remote URL.
    pub fn in_cache(cache_root: &Path, settings: MirrorSettings) -> Self {
        let path = cache_root.join(cache_dir_name(&settings.url));
        Self::new(path, settings)
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn url(&self) -> &str {
        &self.settings.url
    }

    pub fn main_branch(&self) -> &str {
        &self.settings.main_branch
    }

    pub fn is_git_repo(&self) -> bool {
        self.repo_path.join(".git").exists()
    }

    // ========================================================================
    // Network operations
    // ========================================================================

    /// Clones the remote if the mirror does not exist yet.
    pub async fn ensure_cloned(&self) -> Result<()> {
        if self.is_git_repo() {
            return Ok(());
        }

        log::info!(
            "Cloning repository {} to {}",
            redact_url(&self.settings.url),
            self.repo_path.display()
        );
        if let Some(parent) = self.repo_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let repo_path = self.repo_path.to_string_lossy().into_owned();
        self.run_git_network(None, &["clone", "--quiet", &self.settings.url, &repo_path])
            .await?;

        self.git_stdout(&["config", "user.name", &self.settings.user_name])?;
        self.git_stdout(&["config", "user.email", &self.settings.user_email])?;
        Ok(())
    }

    /// Refreshes remote branches, tags and notes.
    pub async fn fetch(&self) -> Result<()> {
        self.ensure_cloned().await?;

        self.run_git_network(
            Some(&self.repo_path),
            &[
                "fetch",
                "--quiet",
                "--force",
                "--prune",
                "--tags",
                REMOTE,
                "+refs/heads/*:refs/remotes/origin/*",
            ],
        )
        .await?;
        self.fetch_notes().await
    }

    /// Fetches every notes namespace, overwriting local notes.
    pub async fn fetch_notes(&self) -> Result<()> {
        self.run_git_network(
            Some(&self.repo_path),
            &["fetch", "--quiet", "--force", REMOTE, "+refs/notes/*:refs/notes/*"],
        )
        .await
        .map(|_| ())
    }

    /// Pushes one notes namespace to the remote.
    pub async fn push_notes(&self, namespace: &str) -> Result<()> {
        let reference = format!("refs/notes/{}", namespace);
        self.run_git_network(
            Some(&self.repo_path),
            &["push", "--quiet", "--force", REMOTE, &reference],
        )
        .await
        .map(|_| ())
    }

    /// Tags `commit` and pushes the tag unless the remote already has it.
    ///
    /// A tag that already points elsewhere (locally or on the remote) is left
    /// untouched and reported as a conflict.
    pub async fn tag_and_push(&self, tag: &str, commit: &str) -> Result<TagOutcome> {
        let reference = format!("refs/tags/{}", tag);

        match self.resolve(&reference)? {
            Some(existing) if existing != commit => {
                return Ok(TagOutcome::Conflict { existing });
            }
            Some(_) => {}
            None => {
                self.git_stdout(&["tag", tag, commit])?;
            }
        }

        let listing = self
            .run_git_network(Some(&self.repo_path), &["ls-remote", REMOTE, &reference])
            .await?;
        match parse_ls_remote(&listing, &reference) {
            Some(remote) if remote == commit => Ok(TagOutcome::AlreadyPresent),
            Some(remote) => Ok(TagOutcome::Conflict { existing: remote }),
            None => {
                self.run_git_network(
                    Some(&self.repo_path),
                    &["push", "--quiet", "--force", REMOTE, &reference],
                )
                .await?;
                Ok(TagOutcome::Pushed)
            }
        }
    }

    // ========================================================================
    // Working tree
    // ========================================================================

    /// Waits for exclusive access to the working tree.
    pub async fn lock_worktree(&self) -> WorktreeGuard<'_> {
        WorktreeGuard {
            mirror: self,
            _guard: self.worktree_lock.lock().await,
        }
    }

    // ========================================================================
    // Read-only accessors
    // ========================================================================

    /// Full commit id for a revision, or `None` if it does not resolve.
    pub fn resolve(&self, rev: &str) -> Result<Option<String>> {
        let spec = format!("{}^{{commit}}", rev);
        let output = self.run_git(&["rev-parse", "--verify", "--quiet", &spec])?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Non-merge commits in `(from, to]`, newest first.
    pub fn commits_between(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let range = format!("{}..{}", from, to);
        let out = self.git_stdout(&["log", "--format=%H", "--no-merges", &range])?;
        Ok(non_empty_lines(&out))
    }

    pub fn commit_subject(&self, commit: &str) -> Result<String> {
        self.git_stdout(&["show", "-s", "--format=%s", commit])
    }

    pub fn commit_author(&self, commit: &str) -> Result<String> {
        self.git_stdout(&["show", "-s", "--format=%an", commit])
    }

    /// Per-file line changes introduced by `commit` against its first parent.
    pub fn file_changes(&self, commit: &str) -> Result<Vec<FileChange>> {
        let out = self.git_stdout(&[
            "diff-tree",
            "--no-commit-id",
            "--numstat",
            "--no-renames",
            "-r",
            "--root",
            commit,
        ])?;
        Ok(parse_numstat(&out))
    }

    /// Contents of `path` at `commit`, or `None` when the file does not exist there.
    pub fn file_contents(&self, commit: &str, path: &str) -> Result<Option<String>> {
        let object = format!("{}:{}", commit, path);
        let output = self.run_git(&["show", &object])?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            Ok(None)
        }
    }

    /// First parent of `commit`.
    pub fn parent(&self, commit: &str) -> Result<String> {
        let out = self.git_stdout(&["log", "--pretty=%P", "-n", "1", commit])?;
        out.split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| MirrorError::UnknownRevision(format!("{} has no parent", commit)))
    }

    pub fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        self.git_stdout(&["merge-base", a, b])
    }

    /// Number of commits reachable from `b` but not from `a`.
    pub fn distance(&self, a: &str, b: &str) -> Result<u64> {
        let range = format!("{}..{}", a, b);
        let out = self.git_stdout(&["rev-list", "--count", &range])?;
        out.trim().parse().map_err(|_| MirrorError::UnexpectedOutput {
            command: format!("rev-list --count {}", range),
            output: out,
        })
    }

    /// Whether `commit` is reachable from `rev`.
    pub fn is_ancestor(&self, commit: &str, rev: &str) -> Result<bool> {
        let output = self.run_git(&["merge-base", "--is-ancestor", commit, rev])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(classify_git_error(&format_git_error(&output))),
        }
    }

    /// Whether `commit` is reachable from the remote branch `branch`.
    pub fn is_on_remote_branch(&self, commit: &str, branch: &str) -> Result<bool> {
        let remote_ref = format!("refs/remotes/{}/{}", REMOTE, branch);
        if self.resolve(&remote_ref)?.is_none() {
            return Ok(false);
        }
        self.is_ancestor(commit, &remote_ref)
    }

    /// Remote branches matching a glob, without the remote prefix.
    pub fn remote_branches(&self, pattern: &str) -> Result<Vec<String>> {
        let glob = format!("{}/{}", REMOTE, pattern);
        let out = self.git_stdout(&["branch", "-r", "--list", &glob])?;
        Ok(parse_remote_branches(&out, REMOTE))
    }

    /// The commit that brought `commit` into `head`'s first-parent history.
    ///
    /// Commits already on the first-parent line represent themselves. Otherwise
    /// the oldest commit on the ancestry path that is also on the first-parent
    /// line is the merge that introduced it.
    pub fn merge_commit_for(&self, commit: &str, head: &str) -> Result<String> {
        let range = format!("{}..{}", commit, head);
        let first_parent: HashSet<String> = non_empty_lines(&self.git_stdout(&[
            "rev-list",
            "--first-parent",
            &range,
        ])?)
        .into_iter()
        .collect();

        if let Ok(parent) = self.parent(commit) {
            let parent_range = format!("{}..{}", parent, head);
            let line = self.git_stdout(&["rev-list", "--first-parent", &parent_range])?;
            if line.lines().any(|l| l.trim() == commit) {
                return Ok(commit.to_string());
            }
        }

        let ancestry = non_empty_lines(&self.git_stdout(&["rev-list", "--ancestry-path", &range])?);
        Ok(ancestry
            .iter()
            .enumerate()
            .filter(|(_, c)| first_parent.contains(*c))
            .max_by_key(|(idx, _)| *idx)
            .map(|(_, c)| c.clone())
            .unwrap_or_else(|| commit.to_string()))
    }

    /// Most recent commit on the checked-out branch touching `path`.
    pub fn latest_commit_for_file(&self, path: &str) -> Result<Option<String>> {
        let out = self.git_stdout(&["log", "-n", "1", "--pretty=format:%H", "--", path])?;
        Ok(Some(out).filter(|s| !s.is_empty()))
    }

    /// Content of the note attached to `object` in `namespace`, if any.
    pub fn notes_show(&self, namespace: &str, object: &str) -> Result<Option<String>> {
        let reference = format!("--ref={}", namespace);
        let output = self.run_git(&["notes", &reference, "show", object])?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim_end().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Attaches (or replaces) a note on `object` in `namespace`.
    pub fn notes_add(&self, namespace: &str, object: &str, content: &str) -> Result<()> {
        let reference = format!("--ref={}", namespace);
        let mut child = Command::new("git")
            .current_dir(&self.repo_path)
            .args(["notes", &reference, "add", "-f", "--file=-", object])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MirrorError::GitOperation(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content.as_bytes())?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| MirrorError::GitOperation(e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn run_git(&self, args: &[&str]) -> Result<Output> {
        if !self.is_git_repo() {
            return Err(MirrorError::NotInitialized(self.repo_path.clone()));
        }

        Command::new("git")
            .current_dir(&self.repo_path)
            .args(args)
            .output()
            .map_err(|e| MirrorError::GitOperation(e.to_string()))
    }

    /// Runs git and returns trimmed stdout, mapping failures through [`classify_git_error`].
    fn git_stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.run_git(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }

    /// Runs a git command that talks to the remote, with credentials and a timeout.
    async fn run_git_network(&self, cwd: Option<&Path>, args: &[&str]) -> Result<String> {
        let auth = build_auth_env(self.settings.token.as_ref())?;

        let mut cmd = TokioCommand::new("git");
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &auth.env_vars {
            cmd.env(key, value);
        }

        let timeout = self.settings.network_timeout;
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| MirrorError::GitTimeout(timeout.as_secs()))?
            .map_err(|e| MirrorError::GitOperation(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }
}

impl WorktreeGuard<'_> {
    pub fn path(&self) -> &Path {
        &self.mirror.repo_path
    }

    pub fn mirror(&self) -> &SourceMirror {
        self.mirror
    }

    /// Discards local modifications and checks out `rev` detached.
    pub fn checkout(&self, rev: &str) -> Result<()> {
        self.mirror.git_stdout(&["reset", "--hard", "--quiet"])?;
        self.mirror
            .git_stdout(&["checkout", "--quiet", "--detach", rev])
            .map(|_| ())
    }

    /// Moves the working tree to the tip of the remote main branch.
    pub fn reset_to_main(&self) -> Result<()> {
        let remote_main = format!("{}/{}", REMOTE, self.mirror.settings.main_branch);
        self.mirror
            .git_stdout(&["checkout", "--quiet", "-B", &self.mirror.settings.main_branch, &remote_main])?;
        self.mirror
            .git_stdout(&["reset", "--hard", "--quiet", &remote_main])
            .map(|_| ())
    }
}

/// Directory name for a remote URL, without scheme or credentials.
fn cache_dir_name(url: &str) -> PathBuf {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let without_auth = without_scheme
        .rsplit_once('@')
        .map_or(without_scheme, |(_, rest)| rest);
    let trimmed = without_auth.trim_start_matches('/').trim_end_matches(".git");
    PathBuf::from(trimmed.replace(':', "_"))
}

/// Strips credentials from a URL before it is logged.
fn redact_url(url: &str) -> String {
    match (url.split_once("://"), url.rsplit_once('@')) {
        (Some((scheme, _)), Some((_, host))) => format!("{}://***@{}", scheme, host),
        _ => url.to_string(),
    }
}
