//! Builders for release index documents.

#![allow(dead_code)]

use release_reconciler::index::{Release, ReleaseIndex, Version};

/// Builds a release index YAML document, newest release first.
#[derive(Default)]
pub struct IndexBuilder {
    index: ReleaseIndex,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a release; following `version` calls add to it.
    pub fn release(mut self, rc_name: &str) -> Self {
        self.index.releases.push(Release {
            rc_name: rc_name.to_string(),
            versions: Vec::new(),
        });
        self
    }

    pub fn version(self, name: &str, commit: &str) -> Self {
        self.push_version(name, commit, false)
    }

    pub fn security_version(self, name: &str, commit: &str) -> Self {
        self.push_version(name, commit, true)
    }

    fn push_version(mut self, name: &str, commit: &str, security_fix: bool) -> Self {
        let release = self
            .index
            .releases
            .last_mut()
            .expect("call release() before version()");
        release.versions.push(Version {
            name: name.to_string(),
            version: commit.to_string(),
            security_fix,
        });
        self
    }

    pub fn build(&self) -> String {
        serde_yaml::to_string(&self.index).expect("Failed to serialize index")
    }
}
