//! Which releases a pass looks at, what they compare against and what they
//! retire.

use crate::index::{Release, ReleaseIndex, Version};
use crate::mirror::{Result, SourceMirror};

/// The newest releases are always worked on, even before anything runs them.
pub const MIN_ACTIVE_RELEASES: usize = 2;

/// Releases from the newest down to the oldest one that has a version
/// running on the network, and at least `minimum` of them.
pub fn active_releases<'a>(
    index: &'a ReleaseIndex,
    running: &[String],
    minimum: usize,
) -> &'a [Release] {
    let oldest_running = index
        .releases
        .iter()
        .rposition(|release| release.versions.iter().any(|v| running.contains(&v.version)));
    if oldest_running.is_none() && !index.releases.is_empty() {
        log::warn!(
            "None of the {} running versions is in the release index",
            running.len()
        );
    }

    let count = oldest_running
        .map(|idx| idx + 1)
        .unwrap_or(0)
        .max(minimum)
        .min(index.releases.len());
    &index.releases[..count]
}

/// Blessed versions that are neither part of an active release nor running.
pub fn versions_to_unelect(active: &[Release], running: &[String], blessed: &[String]) -> Vec<String> {
    let mut retired: Vec<String> = Vec::new();
    for version in blessed {
        let in_active = active.iter().any(|r| r.contains_commit(version));
        if in_active || running.contains(version) || retired.contains(version) {
            continue;
        }
        retired.push(version.clone());
    }
    retired
}

/// The release a version's notes are compared against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRelease {
    pub tag: String,
    pub commit: String,
}

/// Finds the comparison point for `version` of the release at `release_idx`.
///
/// A base version is compared against the base of the next older release.
/// Any other version is compared against the sibling it forked from most
/// recently, measured by distance from the merge base. Returns `None` for
/// the base of the oldest release in the index.
pub fn find_base_release(
    mirror: &SourceMirror,
    index: &ReleaseIndex,
    release_idx: usize,
    version: &Version,
) -> Result<Option<BaseRelease>> {
    let Some(release) = index.releases.get(release_idx) else {
        return Ok(None);
    };

    if version.is_base() {
        let previous = index
            .releases
            .get(release_idx + 1)
            .and_then(|older| older.base().map(|base| (older, base)));
        return Ok(previous.map(|(older, base)| BaseRelease {
            tag: older.tag_for(base),
            commit: base.version.clone(),
        }));
    }

    let mut closest: Option<(u64, &Version)> = None;
    for sibling in release.versions.iter().filter(|v| v.version != version.version) {
        let fork = mirror.merge_base(&sibling.version, &version.version)?;
        let distance = mirror.distance(&fork, &version.version)?;
        if closest.map_or(true, |(best, _)| distance < best) {
            closest = Some((distance, sibling));
        }
    }
    Ok(closest.map(|(_, sibling)| BaseRelease {
        tag: release.tag_for(sibling),
        commit: sibling.version.clone(),
    }))
}
