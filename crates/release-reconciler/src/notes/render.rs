//! Markdown rendering of release notes.

use std::collections::BTreeMap;
use std::fmt::Write;

use super::change::Change;
use super::commit::ChangeType;
use super::teams::reviewers;
use crate::types::OsKind;

pub const REVIEW_CHECKLIST_HEADING: &str = "# Review checklist";
pub const REVIEW_INSTRUCTIONS: &str =
    "<span style=\"color: red\">Please cross-out your team once you finished the review</span>";
pub const RELEASE_NOTES_HEADING: &str = "# Release Notes for";
pub const EXCLUDED_CHANGES_HEADING: &str = "## Excluded Changes";

/// Identifies the release and the release it is compared against.
#[derive(Debug, Clone)]
pub struct NotesHeader<'a> {
    pub release_tag: &'a str,
    pub release_commit: &'a str,
    pub base_tag: &'a str,
    pub base_commit: &'a str,
    pub merge_base: &'a str,
    pub os_kind: OsKind,
}

fn title(release_tag: &str, release_commit: &str) -> String {
    format!(
        "{} [{tag}](https://github.com/dfinity/ic/tree/{tag}) (`{commit}`)",
        RELEASE_NOTES_HEADING,
        tag = release_tag,
        commit = release_commit
    )
}

/// Notes for a security release: a disclosure caveat and the release title.
pub fn render_security(release_tag: &str, release_commit: &str) -> String {
    format!(
        "In accordance with the Security Patch Policy and Procedure that was adopted in \
[proposal 48792](https://dashboard.internetcomputer.org/proposal/48792), \
the source code that was used to build this release will be disclosed at the latest \
10 days after the fix is rolled out to all subnets.\n\
\n\
The community will then be able to retroactively verify the binaries that were rolled out.\n\
\n\
{}\n",
        title(release_tag, release_commit)
    )
}

/// Full notes: reviewer checklist, header, per-type sections and excluded changes.
pub fn render_ordinary(header: &NotesHeader<'_>, changes: &[Change]) -> String {
    let mut out = String::new();
    let os_kind = header.os_kind;

    let _ = writeln!(out, "{}\n\n{}\n", REVIEW_CHECKLIST_HEADING, REVIEW_INSTRUCTIONS);
    for reviewer in reviewers(os_kind) {
        let _ = writeln!(out, "- {}", reviewer.handle);
    }

    let _ = write!(
        out,
        "\n{title}\n\
This release is based on changes since [{base_tag}](https://dashboard.internetcomputer.org/release/{base_commit}) (`{base_commit}`).\n\
\n\
Please note that some commits may be excluded from this release if they're not relevant, or not modifying the {os} image.\n\
Additionally, descriptions of some changes might have been slightly modified to fit the release notes format.\n\
\n\
To see a full list of commits added since last release, compare the revisions on [GitHub](https://github.com/dfinity/ic/compare/{base_tag}...{tag}).\n",
        title = title(header.release_tag, header.release_commit),
        base_tag = header.base_tag,
        base_commit = header.base_commit,
        os = os_kind,
        tag = header.release_tag,
    );

    if header.merge_base != header.base_commit {
        let _ = write!(
            out,
            "\nThis release diverges from the latest release. Merge base is [{mb}](https://github.com/dfinity/ic/tree/{mb}).\n\
Changes [were removed](https://github.com/dfinity/ic/compare/{tag}...{base_tag}) from this release.\n",
            mb = header.merge_base,
            tag = header.release_tag,
            base_tag = header.base_tag,
        );
    }

    let mut by_type: BTreeMap<ChangeType, Vec<&Change>> = BTreeMap::new();
    let mut by_reason: BTreeMap<&str, Vec<&Change>> = BTreeMap::new();
    for change in changes {
        match &change.exclusion_reason {
            Some(reason) => by_reason.entry(reason.as_str()).or_default().push(change),
            None => by_type.entry(change.change_type).or_default().push(change),
        }
    }

    for change_type in ChangeType::ALL {
        let Some(entries) = by_type.get_mut(&change_type) else {
            continue;
        };
        entries.sort_by_key(|c| c.team_label());
        let _ = writeln!(out, "\n## {}:\n", change_type.section_title());
        for change in entries.iter() {
            let _ = writeln!(out, "* {}", format_line(change));
        }
    }

    if !by_reason.is_empty() {
        let _ = writeln!(out, "\n{}", EXCLUDED_CHANGES_HEADING);
        for (reason, entries) in by_reason.iter_mut() {
            entries.sort_by_key(|c| c.team_label());
            let _ = writeln!(out, "\n### {}\n", reason);
            for change in entries.iter() {
                let _ = writeln!(
                    out,
                    "* ~~{} [AUTO-EXCLUDED:{}]~~",
                    format_line(change),
                    reason
                );
            }
        }
    }

    out
}

/// `author: <who> | [`<hash>`](<url>) <team>(<scope>)?: <message>`
fn format_line(change: &Change) -> String {
    let team = change.team_label();
    let scope = if change.scope.is_empty() || change.scope.eq_ignore_ascii_case(&team) {
        ":".to_string()
    } else {
        format!("({}):", change.scope)
    };
    format!(
        "author: {} | [`{hash}`](https://github.com/dfinity/ic/commit/{hash}) {}{} {}",
        change.author,
        team,
        scope,
        change.message,
        hash = change.display_hash,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn change(hash: &str, team: &str, ty: ChangeType, reason: Option<&str>) -> Change {
        Change {
            commit: hash.repeat(5),
            display_hash: hash.to_string(),
            teams: [team.to_string()].into_iter().collect::<BTreeSet<_>>(),
            change_type: ty,
            scope: String::new(),
            message: format!("change {}", hash),
            author: "Ada  Love".to_string(),
            exclusion_reason: reason.map(str::to_string),
        }
    }

    fn header() -> NotesHeader<'static> {
        NotesHeader {
            release_tag: "release-2025-10-02_03-13-base",
            release_commit: "aaaa",
            base_tag: "release-2025-09-25_09-52-base",
            base_commit: "bbbb",
            merge_base: "bbbb",
            os_kind: OsKind::GuestOs,
        }
    }

    #[test]
    fn test_sections_in_fixed_order() {
        let notes = render_ordinary(
            &header(),
            &[
                change("c3", "execution", ChangeType::Other, None),
                change("c1", "execution", ChangeType::Fix, None),
                change("c2", "execution", ChangeType::Feat, None),
                change("c4", "boundary-node", ChangeType::Feat, Some("Not modifying GuestOS")),
            ],
        );
        let feat = notes.find("## Features:").unwrap();
        let fix = notes.find("## Bugfixes:").unwrap();
        let other = notes.find("## Other:").unwrap();
        let excluded = notes.find(EXCLUDED_CHANGES_HEADING).unwrap();
        assert!(feat < fix && fix < other && other < excluded);
        assert!(notes.contains(
            "* author: Ada  Love | [`c1`](https://github.com/dfinity/ic/commit/c1) Execution: change c1"
        ));
        assert!(notes.contains("### Not modifying GuestOS"));
        assert!(notes.contains("* ~~author: Ada  Love | [`c4`](https://github.com/dfinity/ic/commit/c4) Boundary Nodes: change c4 [AUTO-EXCLUDED:Not modifying GuestOS]~~"));
        assert!(!notes.contains("diverges"));
    }

    #[test]
    fn test_header_contents() {
        let notes = render_ordinary(&header(), &[]);
        assert!(notes.starts_with("# Review checklist\n\n<span style=\"color: red\">"));
        assert!(notes.contains("- @team-execution\n- @team-messaging\n"));
        assert!(notes.contains(
            "# Release Notes for [release-2025-10-02_03-13-base](https://github.com/dfinity/ic/tree/release-2025-10-02_03-13-base) (`aaaa`)"
        ));
        assert!(notes.contains("compare/release-2025-09-25_09-52-base...release-2025-10-02_03-13-base"));
        assert!(!notes.contains(EXCLUDED_CHANGES_HEADING));
    }

    #[test]
    fn test_divergence_note() {
        let mut h = header();
        h.merge_base = "cccc";
        let notes = render_ordinary(&h, &[]);
        assert!(notes.contains("This release diverges from the latest release. Merge base is [cccc]"));
    }

    #[test]
    fn test_security_notes_start_with_caveat() {
        let notes = render_security("release-2025-10-02_03-13-base", "aaaa");
        assert!(notes.starts_with("In accordance with the Security Patch Policy"));
        assert!(notes.contains("\n# Release Notes for [release-2025-10-02_03-13-base]"));
        assert!(!notes.contains(REVIEW_CHECKLIST_HEADING));
    }

    #[test]
    fn test_scope_equal_to_team_is_omitted() {
        let mut c = change("c1", "execution", ChangeType::Feat, None);
        c.scope = "execution".to_string();
        assert!(format_line(&c).contains("Execution: change c1"));
        c.scope = "wasm".to_string();
        assert!(format_line(&c).contains("Execution(wasm): change c1"));
    }
}
