//! Value types returned by the mirror.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Line changes for one file in one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Repository-relative path.
    pub path: String,
    /// Added plus deleted lines; zero for binary files.
    pub lines: u64,
}

/// Result of tagging a release commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    /// The tag was created (if needed) and pushed.
    Pushed,
    /// The remote already had the tag at this commit.
    AlreadyPresent,
    /// The tag exists at another commit; nothing was changed.
    Conflict { existing: String },
}

/// How to reach and authenticate against the mirrored remote.
#[derive(Debug, Clone)]
pub struct MirrorSettings {
    /// Remote URL (HTTPS or a local path).
    pub url: String,
    /// Branch that tracks the tip of development.
    pub main_branch: String,
    /// Token offered over `GIT_ASKPASS` for HTTPS remotes.
    pub token: Option<SecretString>,
    /// Bound on clone/fetch/push duration.
    pub network_timeout: Duration,
    /// Identity recorded on notes commits.
    pub user_name: String,
    pub user_email: String,
}

impl MirrorSettings {
    pub fn new(url: impl Into<String>, main_branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            main_branch: main_branch.into(),
            token: None,
            network_timeout: Duration::from_secs(600),
            user_name: "Release Reconciler".to_string(),
            user_email: "release-reconciler@localhost".to_string(),
        }
    }

    pub fn with_token(mut self, token: Option<SecretString>) -> Self {
        self.token = token;
        self
    }
}
