//! Reviewer sign-off detection and clean-up of approved notes.

use std::sync::LazyLock;

use regex::Regex;

static RE_AUTHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*[*-] )author:[^|]+\| ").unwrap());
static RE_HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_UNDERLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[=-]+$").unwrap());

const NOTES_MARKER: &str = "Release Notes";
const CHECKLIST_TITLE: &str = "Review checklist";
const CHECKLIST_INSTRUCTIONS: &str = "Please cross-out your team once you finished the review";

fn is_checklist_title(line: &str) -> bool {
    line.trim_start_matches('#').trim() == CHECKLIST_TITLE
}

fn is_checklist_boilerplate(line: &str) -> bool {
    let text = RE_HTML_TAG.replace_all(line, "");
    let text = text.trim();
    text.is_empty()
        || is_checklist_title(text)
        || RE_UNDERLINE.is_match(text)
        || text == CHECKLIST_INSTRUCTIONS
}

/// Returns the text to publish once every reviewer has crossed out their
/// row, or `None` while the notes are still under review.
///
/// Crossed-out lines (reviewer rows and excluded changes) are dropped and
/// authors are removed from change lines. With a checklist, everything
/// before the release-notes heading must be checklist boilerplate and the
/// published text starts at that heading. Notes without a checklist
/// (security releases) are published whole.
pub fn prepare_publication(markdown: &str) -> Option<String> {
    let kept: Vec<String> = markdown
        .lines()
        .filter(|line| !line.contains("~~"))
        .map(|line| RE_AUTHOR.replace(line, "$1").into_owned())
        .collect();

    let heading_idx = kept.iter().position(|line| line.contains(NOTES_MARKER))?;
    let preamble = &kept[..heading_idx];

    let body = if preamble.iter().any(|line| is_checklist_title(line)) {
        if !preamble.iter().all(|line| is_checklist_boilerplate(line)) {
            return None;
        }
        &kept[heading_idx..]
    } else {
        &kept[..]
    };

    let mut changelog = body.join("\n").trim().to_string();
    changelog.push('\n');
    Some(changelog)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTES: &str = "# Review checklist\n\nPlease cross-out your team once you finished the review\n\n\
* ~~@team-execution~~\n* @team-messaging\n\n\
# Release Notes for [release-x](https://github.com/dfinity/ic/tree/release-x) (`abc`)\n\n\
## Features:\n\n\
* author: Ada Lovelace | [`abc123456`](https://github.com/dfinity/ic/commit/abc123456) Execution: add things\n\n\
## Excluded Changes\n\n### not a GuestOS change\n\n\
* ~~author: Ada Lovelace | [`def`](https://github.com/dfinity/ic/commit/def) Node: x [AUTO-EXCLUDED:not a GuestOS change]~~\n";

    #[test]
    fn test_pending_reviewer_blocks_publication() {
        assert_eq!(prepare_publication(NOTES), None);
    }

    #[test]
    fn test_approved_notes_are_cleaned() {
        let approved = NOTES.replace("* @team-messaging", "* ~~@team-messaging~~");
        let changelog = prepare_publication(&approved).unwrap();
        assert!(changelog.starts_with("# Release Notes for [release-x]"));
        assert!(changelog.contains(
            "* [`abc123456`](https://github.com/dfinity/ic/commit/abc123456) Execution: add things"
        ));
        assert!(!changelog.contains("author:"));
        assert!(!changelog.contains("~~"));
        assert!(!changelog.contains("Review checklist"));
    }

    #[test]
    fn test_setext_checklist_and_html_instructions() {
        let notes = "Review checklist\n================\n\n\
<span style=\"color: red\">Please cross-out your team once you finished the review</span>\n\n\
- ~~@node-team~~\n\nRelease Notes for x\n===\n\nbody\n";
        assert_eq!(
            prepare_publication(notes).unwrap(),
            "Release Notes for x\n===\n\nbody\n"
        );
    }

    #[test]
    fn test_missing_heading_is_not_ready() {
        assert_eq!(prepare_publication("# Review checklist\n\n* ~~@a~~\n"), None);
    }

    #[test]
    fn test_security_notes_publish_whole() {
        let notes = "In accordance with the Security Patch Policy.\n\n# Release Notes for [t](u) (`c`)\n";
        let changelog = prepare_publication(notes).unwrap();
        assert!(changelog.starts_with("In accordance with"));
        assert!(changelog.contains("# Release Notes for"));
    }
}
