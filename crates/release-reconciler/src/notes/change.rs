//! One commit, described for the release notes.

use std::collections::BTreeSet;

use super::codeowners::{owning_teams, tally_ownership, CodeOwners};
use super::commit::{abbreviate_author, clean_subject, ChangeType, ConventionalCommit};
use super::filters::{all_paths_excluded, is_excluded_scope, touches_packages};
use super::teams::{is_os_team, pretty_team_name};
use crate::mirror::FileChange;
use crate::types::{CommitInclusion, OsKind};

/// Length of commit hashes shown in the notes.
pub const COMMIT_HASH_LENGTH: usize = 9;

/// A commit with more owning teams than this is filed under `Other`.
const MAX_TEAMS_FOR_TYPE: usize = 2;

/// Raw facts about a commit, gathered from the mirror.
#[derive(Debug, Clone)]
pub struct CommitFacts {
    pub commit: String,
    /// The commit that brought this one into the release's first-parent history.
    pub merge_commit: String,
    pub subject: String,
    pub author: String,
    pub file_changes: Vec<FileChange>,
    pub codeowners: CodeOwners,
}

/// A rendered-ready change entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub commit: String,
    /// Abbreviated hash of the merge commit.
    pub display_hash: String,
    pub teams: BTreeSet<String>,
    pub change_type: ChangeType,
    pub scope: String,
    pub message: String,
    pub author: String,
    /// Why the change is struck from the notes, if it is.
    pub exclusion_reason: Option<String>,
}

impl Change {
    pub fn is_excluded(&self) -> bool {
        self.exclusion_reason.is_some()
    }

    /// Comma separated display names of the owning teams, or `General`.
    pub fn team_label(&self) -> String {
        if self.teams.is_empty() {
            return "General".to_string();
        }
        let mut names: Vec<&str> = Vec::new();
        for team in &self.teams {
            let name = pretty_team_name(team);
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names.join(",")
    }
}

/// Turns commit facts and a verdict into a change entry.
///
/// `packages` is the OS image's dependency listing when known; changes that
/// touch none of those packages are excluded.
pub fn describe_change(
    facts: &CommitFacts,
    inclusion: CommitInclusion,
    packages: Option<&BTreeSet<String>>,
    os_kind: OsKind,
) -> Change {
    let conventional = ConventionalCommit::parse(&clean_subject(&facts.subject));
    let tally = tally_ownership(&facts.codeowners, &facts.file_changes);
    let teams = owning_teams(&tally);

    let change_type = if teams.len() > MAX_TEAMS_FOR_TYPE {
        ChangeType::Other
    } else {
        conventional.change_type
    };
    let scope = conventional.scope.unwrap_or_default();

    let exclusion_reason = exclusion_reason(facts, inclusion, packages, &teams, &scope, os_kind);

    Change {
        commit: facts.commit.clone(),
        display_hash: facts
            .merge_commit
            .chars()
            .take(COMMIT_HASH_LENGTH)
            .collect(),
        teams,
        change_type,
        scope,
        message: conventional.message,
        author: abbreviate_author(&facts.author),
        exclusion_reason,
    }
}

fn exclusion_reason(
    facts: &CommitFacts,
    inclusion: CommitInclusion,
    packages: Option<&BTreeSet<String>>,
    teams: &BTreeSet<String>,
    scope: &str,
    os_kind: OsKind,
) -> Option<String> {
    if facts.file_changes.is_empty() {
        return Some(format!("Not modifying {}", os_kind));
    }
    match inclusion {
        CommitInclusion::DoesNotBelong => return Some(format!("Not modifying {}", os_kind)),
        CommitInclusion::Failed => {
            return Some(format!("Could not determine whether it modifies {}", os_kind))
        }
        CommitInclusion::Belongs => {}
    }

    if all_paths_excluded(&facts.file_changes) {
        return Some("Changed files are excluded by file path filter".to_string());
    }
    if !teams.iter().any(|t| is_os_team(t)) {
        return Some("The change is not owned by any replica or HostOS team".to_string());
    }
    if is_excluded_scope(scope) {
        return Some(format!(
            "Scope of the change ({}) is not related to the artifact",
            scope
        ));
    }
    if let Some(packages) = packages {
        if !touches_packages(&facts.file_changes, packages) {
            return Some(format!("Does not touch any {} package", os_kind));
        }
    }
    None
}
