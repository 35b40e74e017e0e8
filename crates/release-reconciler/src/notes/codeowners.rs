//! CODEOWNERS parsing and per-commit team ownership.

use std::collections::{BTreeMap, BTreeSet};

use glob::Pattern;

use super::teams::{is_os_team, CATCH_ALL_OWNER, SENTINEL_OWNERS, UNKNOWN_OWNER};
use crate::mirror::FileChange;

/// Location of the ownership file in the source repository.
pub const CODEOWNERS_PATH: &str = ".github/CODEOWNERS";

/// Teams keep their place in a commit if they own at least this share of the
/// top team's changed lines.
pub const OWNERSHIP_THRESHOLD: f64 = 0.5;

const TEAM_PREFIX: &str = "@dfinity/";

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    teams: Vec<String>,
}

/// Parsed ownership rules, in file order.
#[derive(Debug, Clone, Default)]
pub struct CodeOwners {
    rules: Vec<Rule>,
}

impl CodeOwners {
    /// Parses CODEOWNERS text. Only `@dfinity/` teams are kept; malformed
    /// patterns are skipped.
    pub fn parse(text: &str) -> Self {
        let rules = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let raw = fields.next()?;
                let teams: Vec<String> = fields
                    .filter_map(|owner| owner.split_once(TEAM_PREFIX).map(|(_, t)| t.to_string()))
                    .collect();
                if teams.is_empty() {
                    return None;
                }
                let pattern = Pattern::new(&normalize_pattern(raw)).ok()?;
                Some(Rule { pattern, teams })
            })
            .collect();
        Self { rules }
    }

    /// Teams owning `path`; the last matching rule wins.
    pub fn owners_of(&self, path: &str) -> Option<&[String]> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.pattern.matches(path))
            .map(|rule| rule.teams.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Anchors a pattern at the repository root and lets directory patterns match
/// everything below them.
fn normalize_pattern(raw: &str) -> String {
    let anchored = raw.trim_start_matches('/');
    if anchored.ends_with('/') {
        format!("{}*", anchored)
    } else {
        anchored.to_string()
    }
}

/// Changed lines per team for one commit.
pub fn tally_ownership(owners: &CodeOwners, changes: &[FileChange]) -> BTreeMap<String, u64> {
    let mut tally: BTreeMap<String, u64> = BTreeMap::new();
    for change in changes {
        match owners.owners_of(&change.path) {
            Some(teams) => {
                for team in teams {
                    *tally.entry(team.clone()).or_default() += change.lines;
                }
            }
            None => *tally.entry(UNKNOWN_OWNER.to_string()).or_default() += change.lines,
        }
    }
    tally
}

/// Teams credited with a commit.
///
/// OS teams are considered first: those within the threshold of the top OS
/// team are kept. Only if no OS team is involved do other teams compete the
/// same way. Sentinel owners are never credited.
pub fn owning_teams(tally: &BTreeMap<String, u64>) -> BTreeSet<String> {
    let mut tally: BTreeMap<&str, u64> = tally
        .iter()
        .filter(|(team, _)| !SENTINEL_OWNERS.contains(&team.as_str()))
        .map(|(team, lines)| (team.as_str(), *lines))
        .collect();

    let os_teams = tally.keys().filter(|t| is_os_team(t)).count();
    if os_teams > 1 {
        tally.remove(CATCH_ALL_OWNER);
    }

    let pick = |candidates: Vec<(&str, u64)>| -> BTreeSet<String> {
        let max = candidates.iter().map(|(_, l)| *l).max().unwrap_or(0) as f64;
        candidates
            .into_iter()
            .filter(|(_, lines)| *lines as f64 >= max * OWNERSHIP_THRESHOLD)
            .map(|(team, _)| team.to_string())
            .collect()
    };

    let replica: Vec<(&str, u64)> = tally
        .iter()
        .filter(|(team, _)| is_os_team(team))
        .map(|(t, l)| (*t, *l))
        .collect();
    let teams = pick(replica);
    if !teams.is_empty() {
        return teams;
    }
    pick(tally.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODEOWNERS: &str = "\
# comment
* @dfinity/ic-owners-owners
/rs/execution/ @dfinity/execution
rs/consensus/ @dfinity/consensus
/rs/nns/ @dfinity/nns-team
/rs/execution/legacy.rs @dfinity/runtime someone@example.com
/docs/ @octocat
";

    fn change(path: &str, lines: u64) -> FileChange {
        FileChange {
            path: path.to_string(),
            lines,
        }
    }

    #[test]
    fn test_last_matching_rule_wins() {
        let owners = CodeOwners::parse(CODEOWNERS);
        assert_eq!(
            owners.owners_of("rs/execution/src/lib.rs").unwrap(),
            ["execution".to_string()]
        );
        assert_eq!(
            owners.owners_of("rs/execution/legacy.rs").unwrap(),
            ["runtime".to_string()]
        );
        assert_eq!(
            owners.owners_of("README.md").unwrap(),
            ["ic-owners-owners".to_string()]
        );
        // rules without @dfinity teams are dropped, so the catch-all applies
        assert_eq!(
            owners.owners_of("docs/index.md").unwrap(),
            ["ic-owners-owners".to_string()]
        );
    }

    #[test]
    fn test_unmatched_files_are_unknown() {
        let owners = CodeOwners::parse("/rs/execution/ @dfinity/execution\n");
        let tally = tally_ownership(&owners, &[change("Cargo.lock", 10)]);
        assert_eq!(tally.get(UNKNOWN_OWNER), Some(&10));
    }

    #[test]
    fn test_os_teams_take_precedence() {
        let owners = CodeOwners::parse(CODEOWNERS);
        let tally = tally_ownership(
            &owners,
            &[
                change("rs/nns/governance/src/lib.rs", 500),
                change("rs/execution/src/lib.rs", 10),
            ],
        );
        let teams = owning_teams(&tally);
        assert_eq!(teams.into_iter().collect::<Vec<_>>(), vec!["execution".to_string()]);
    }

    #[test]
    fn test_threshold_keeps_close_teams() {
        let owners = CodeOwners::parse(CODEOWNERS);
        let tally = tally_ownership(
            &owners,
            &[
                change("rs/execution/src/lib.rs", 100),
                change("rs/consensus/src/lib.rs", 60),
                change("README.md", 5),
            ],
        );
        let teams: Vec<_> = owning_teams(&tally).into_iter().collect();
        assert_eq!(teams, vec!["consensus".to_string(), "execution".to_string()]);
    }

    #[test]
    fn test_sentinels_never_credited() {
        let mut tally = BTreeMap::new();
        tally.insert("ghost".to_string(), 100);
        tally.insert("owners-owners".to_string(), 100);
        tally.insert("idx".to_string(), 1);
        let teams: Vec<_> = owning_teams(&tally).into_iter().collect();
        assert_eq!(teams, vec!["idx".to_string()]);
    }
}
