//! Reply bodies for release topics, and parsing them back.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::OsKind;

pub const PLACEHOLDER_BODY: &str = "The proposal for the next release will be announced soon.";

static RE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[a new (GuestOS|HostOS) release\]\(https://github\.com/dfinity/ic/tree/[^)]+\) \(`([0-9a-f]{40})`\)").unwrap()
});
static RE_PROPOSAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[IC NNS Proposal (\d+)\]\(https://dashboard\.internetcomputer\.org/proposal/\d+\)").unwrap()
});

/// What a reply slot should say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyContent {
    /// Notes composed but not yet approved by reviewers.
    Draft { changelog: String },
    /// Approved notes, proposal not yet placed.
    Ready { changelog: String },
    /// Proposal placed; the summary is what was submitted.
    Voting { proposal_id: u64, summary: String },
}

/// One reply slot in a release topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub version: String,
    pub os_kind: OsKind,
    pub tag: String,
    /// `None` while nothing can be said about this version yet.
    pub content: Option<ReplyContent>,
}

impl Reply {
    /// Rendered body, if the slot has content.
    pub fn body(&self) -> Option<String> {
        self.content
            .as_ref()
            .map(|content| render_reply(&self.tag, &self.version, self.os_kind, content))
    }
}

pub fn render_reply(tag: &str, version: &str, os_kind: OsKind, content: &ReplyContent) -> String {
    let release_link = format!(
        "[a new {} release](https://github.com/dfinity/ic/tree/{}) (`{}`)",
        os_kind, tag, version
    );
    match content {
        ReplyContent::Draft { changelog } => format!(
            "We're preparing {}.\n\nThe following is a **draft** of the list of changes since the last {} release:\n\n{}",
            release_link, os_kind, changelog
        ),
        ReplyContent::Ready { changelog } => format!(
            "We're preparing {}.\n\nThe following is the list of changes since the last {} release:\n\n{}",
            release_link, os_kind, changelog
        ),
        ReplyContent::Voting {
            proposal_id,
            summary,
        } => format!(
            "Hello there!\n\nVoting is now open for {}.\nThe NNS proposal is here: [IC NNS Proposal {id}](https://dashboard.internetcomputer.org/proposal/{id}).\n\nHere is a summary of the changes since the last {} release:\n\n{}",
            release_link,
            os_kind,
            summary,
            id = proposal_id
        ),
    }
}

/// Identity recovered from a reply body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub version: String,
    pub os_kind: OsKind,
    pub proposal_id: Option<u64>,
}

pub fn parse_reply(body: &str) -> Option<ParsedReply> {
    let caps = RE_VERSION.captures(body)?;
    let os_kind = caps[1].parse().ok()?;
    let proposal_id = RE_PROPOSAL
        .captures(body)
        .and_then(|c| c[1].parse().ok());
    Some(ParsedReply {
        version: caps[2].to_string(),
        os_kind,
        proposal_id,
    })
}
