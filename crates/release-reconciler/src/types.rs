//! Shared domain types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating-system artifact a release version is elected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OsKind {
    #[serde(rename = "GuestOS")]
    GuestOs,
    #[serde(rename = "HostOS")]
    HostOs,
}

impl OsKind {
    /// Both OS kinds, in the order the reconciler processes them.
    pub const ALL: [OsKind; 2] = [OsKind::GuestOs, OsKind::HostOs];

    pub fn as_str(&self) -> &'static str {
        match self {
            OsKind::GuestOs => "GuestOS",
            OsKind::HostOs => "HostOS",
        }
    }

    /// Git notes namespace holding the commit-change verdicts.
    pub fn changed_notes_namespace(&self) -> &'static str {
        match self {
            OsKind::GuestOs => "guestos-changed",
            OsKind::HostOs => "hostos-changed",
        }
    }

    /// Git notes namespace holding the build-graph dependency listing.
    pub fn targets_notes_namespace(&self) -> &'static str {
        match self {
            OsKind::GuestOs => "guestos-targets",
            OsKind::HostOs => "hostos-targets",
        }
    }

    /// Build target expression producing the artifact.
    pub fn target_expression(&self) -> &'static str {
        match self {
            OsKind::GuestOs => {
                "//ic-os/guestos/envs/prod:update-img.tar.zst union //ic-os/setupos/envs/prod:disk-img.tar.zst"
            }
            OsKind::HostOs => {
                "//ic-os/hostos/envs/prod:update-img.tar.zst union //ic-os/setupos/envs/prod:disk-img.tar.zst"
            }
        }
    }

    /// Directory of the canonical repository holding published change-logs.
    pub fn releases_dir(&self) -> &'static str {
        match self {
            OsKind::GuestOs => "replica-releases",
            OsKind::HostOs => "host-os-releases",
        }
    }

    /// Path segment of the artifact on the download CDN.
    pub fn package_dir(&self) -> &'static str {
        match self {
            OsKind::GuestOs => "guest-os",
            OsKind::HostOs => "host-os",
        }
    }

    /// Flag passed to the reproducibility check script.
    pub fn repro_check_flag(&self) -> &'static str {
        match self {
            OsKind::GuestOs => "--guestos",
            OsKind::HostOs => "--hostos",
        }
    }
}

impl fmt::Display for OsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "guestos" => Ok(OsKind::GuestOs),
            "hostos" => Ok(OsKind::HostOs),
            other => Err(format!("unknown OS kind '{}'", other)),
        }
    }
}

/// Verdict of the commit-change determinator for a (commit, OS kind) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommitInclusion {
    Belongs,
    DoesNotBelong,
    Failed,
}

impl CommitInclusion {
    /// Value stored in Git notes and served by the annotation endpoint.
    pub fn as_note(&self) -> &'static str {
        match self {
            CommitInclusion::Belongs => "True",
            CommitInclusion::DoesNotBelong => "False",
            CommitInclusion::Failed => "Failed",
        }
    }

    pub fn from_note(note: &str) -> Option<Self> {
        match note.trim() {
            "True" => Some(CommitInclusion::Belongs),
            "False" => Some(CommitInclusion::DoesNotBelong),
            "Failed" => Some(CommitInclusion::Failed),
            _ => None,
        }
    }
}
