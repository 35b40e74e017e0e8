//! Commit message parsing.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static RE_CONVENTIONAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)(\([^\)]*\))?: (.+)$").unwrap());
// Jira-style ticket references, optionally followed by a colon
static RE_TICKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\b[A-Z]{2,}\d?-\d+\b:?").unwrap());
static RE_EMPTY_BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\[ *\]:?").unwrap());
static RE_PR_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(#(\d+)\)").unwrap());

/// Change types, in the order their sections are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeType {
    Feat,
    Fix,
    Perf,
    Chore,
    Refactor,
    Test,
    Other,
}

impl ChangeType {
    pub const ALL: [ChangeType; 7] = [
        ChangeType::Feat,
        ChangeType::Fix,
        ChangeType::Perf,
        ChangeType::Chore,
        ChangeType::Refactor,
        ChangeType::Test,
        ChangeType::Other,
    ];

    /// Unknown types (and documentation changes) fall into `Other`.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "feat" => Self::Feat,
            "fix" => Self::Fix,
            "perf" => Self::Perf,
            "chore" => Self::Chore,
            "refactor" => Self::Refactor,
            "test" => Self::Test,
            _ => Self::Other,
        }
    }

    pub fn section_title(&self) -> &'static str {
        match self {
            Self::Feat => "Features",
            Self::Fix => "Bugfixes",
            Self::Perf => "Performance improvements",
            Self::Chore => "Chores",
            Self::Refactor => "Refactoring",
            Self::Test => "Tests",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section_title())
    }
}

/// `<type>(<scope>)?: <message>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionalCommit {
    pub change_type: ChangeType,
    pub scope: Option<String>,
    pub message: String,
}

impl ConventionalCommit {
    /// Parses a (cleaned) subject line. Non-conventional subjects become `Other`
    /// with the whole subject as message.
    pub fn parse(subject: &str) -> Self {
        match RE_CONVENTIONAL.captures(subject) {
            Some(caps) => Self {
                change_type: ChangeType::parse(&caps[1]),
                scope: caps
                    .get(2)
                    .map(|m| m.as_str()[1..m.as_str().len() - 1].to_string())
                    .filter(|s| !s.is_empty()),
                message: caps[3].to_string(),
            },
            None => Self {
                change_type: ChangeType::Other,
                scope: None,
                message: subject.to_string(),
            },
        }
    }
}

/// Strips ticket references and empty brackets and links pull request numbers.
pub fn clean_subject(subject: &str) -> String {
    let stripped = RE_TICKET.replace_all(subject, "");
    let stripped = RE_EMPTY_BRACKETS.replace_all(&stripped, "");
    let linked = RE_PR_NUMBER.replace_all(
        &stripped,
        "([#$1](https://github.com/dfinity/ic/pull/$1))",
    );
    linked.trim().to_string()
}

/// First four letters of the first two name parts, each padded to four.
pub fn abbreviate_author(author: &str) -> String {
    let mut parts = author.split_whitespace();
    let first: String = parts.next().unwrap_or("").chars().take(4).collect();
    let last: String = parts.next().unwrap_or("").chars().take(4).collect();
    format!("{:<4} {:<4}", first, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conventional_with_scope() {
        let c = ConventionalCommit::parse("feat(execution): faster wasm");
        assert_eq!(c.change_type, ChangeType::Feat);
        assert_eq!(c.scope.as_deref(), Some("execution"));
        assert_eq!(c.message, "faster wasm");
    }

    #[test]
    fn test_unknown_and_docs_types_are_other() {
        assert_eq!(ConventionalCommit::parse("docs: readme").change_type, ChangeType::Other);
        assert_eq!(ConventionalCommit::parse("build: bazel").change_type, ChangeType::Other);
        let c = ConventionalCommit::parse("Merge stuff");
        assert_eq!(c.change_type, ChangeType::Other);
        assert_eq!(c.message, "Merge stuff");
    }

    #[test]
    fn test_clean_subject_strips_tickets_and_links_prs() {
        assert_eq!(
            clean_subject("feat(nns): NNS1-1234: add thing (#567)"),
            "feat(nns): add thing ([#567](https://github.com/dfinity/ic/pull/567))"
        );
        assert_eq!(clean_subject("[]: fix(crypto): [ ] tidy"), "fix(crypto): tidy");
        assert_eq!(clean_subject("chore: RUN-42 bump"), "chore: bump");
    }

    #[test]
    fn test_abbreviate_author() {
        assert_eq!(abbreviate_author("Alexander Smith"), "Alex Smit");
        assert_eq!(abbreviate_author("Bo"), "Bo       ");
        assert_eq!(abbreviate_author("Jo Li"), "Jo   Li  ");
    }
}
