//! Release index data model.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::OsKind;

/// Name every release must give its primary version.
pub const BASE_VERSION_NAME: &str = "base";

const RC_PREFIX: &str = "rc--";
const RC_DATE_FORMAT: &str = "%Y-%m-%d_%H-%M";

/// Declarative list of release candidates, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseIndex {
    #[serde(default)]
    pub releases: Vec<Release>,
}

/// A release candidate branch and the versions proposed from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Branch name, `rc--YYYY-MM-DD_HH-MM`.
    pub rc_name: String,
    /// Versions in declared order.
    #[serde(default)]
    pub versions: Vec<Version>,
}

/// A named commit within a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Unique within the release; one entry is `base`.
    pub name: String,
    /// Full 40-character commit id.
    pub version: String,
    /// Security fixes get withheld release notes.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub security_fix: bool,
}

impl Release {
    /// The `YYYY-MM-DD_HH-MM` part of the rc name.
    pub fn date_part(&self) -> &str {
        self.rc_name.strip_prefix(RC_PREFIX).unwrap_or(&self.rc_name)
    }

    /// Parsed branch timestamp, or `None` if the name is malformed.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        let date = self.rc_name.strip_prefix(RC_PREFIX)?;
        NaiveDateTime::parse_from_str(date, RC_DATE_FORMAT).ok()
    }

    pub fn base(&self) -> Option<&Version> {
        self.versions.iter().find(|v| v.is_base())
    }

    /// Human tag for one of this release's versions.
    pub fn tag_for(&self, version: &Version) -> String {
        human_tag(&self.rc_name, &version.name)
    }

    pub fn contains_commit(&self, commit: &str) -> bool {
        self.versions.iter().any(|v| v.version == commit)
    }
}

impl Version {
    pub fn is_base(&self) -> bool {
        self.name == BASE_VERSION_NAME
    }
}

/// `release-<YYYY-MM-DD_HH-MM>-<name>` for a release candidate and version name.
pub fn human_tag(rc_name: &str, name: &str) -> String {
    format!(
        "release-{}-{}",
        rc_name.strip_prefix(RC_PREFIX).unwrap_or(rc_name),
        name
    )
}

/// Title of the editable change-log document for a version.
pub fn document_title(os_kind: OsKind, tag: &str, commit: &str) -> String {
    format!("{} Release Notes - {} ({})", os_kind, tag, commit)
}
