//! Team tables used for ownership and review.

use crate::types::OsKind;

/// Teams whose code ends up in the OS images.
pub const REPLICA_TEAMS: &[&str] = &[
    "consensus-owners",
    "consensus",
    "crypto-team",
    "dept-crypto-library",
    "execution-owners",
    "execution",
    "ic-interface-owners",
    "ic-message-routing-owners",
    "interface-owners",
    "message-routing-owners",
    "networking-team",
    "networking",
    "node-team",
    "node",
    "Orchestrator",
    "runtime-owners",
    "runtime",
    "ic-owners-owners",
];

/// Owners that do not count as a reviewing team.
pub const SENTINEL_OWNERS: &[&str] = &["ghost", "owners-owners"];

/// Catch-all owner; dropped when more than one replica team is involved.
pub const CATCH_ALL_OWNER: &str = "ic-owners-owners";

/// Owner assigned to files no rule matches.
pub const UNKNOWN_OWNER: &str = "unknown";

/// A team that signs off release notes by crossing itself out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reviewer {
    pub name: &'static str,
    /// How the team is addressed in the review checklist.
    pub handle: &'static str,
}

const GUESTOS_REVIEWERS: &[Reviewer] = &[
    Reviewer {
        name: "execution",
        handle: "@team-execution",
    },
    Reviewer {
        name: "messaging",
        handle: "@team-messaging",
    },
];

const HOSTOS_REVIEWERS: &[Reviewer] = &[Reviewer {
    name: "node",
    handle: "@node-team",
}];

/// Reviewers who must approve release notes for `os_kind`.
pub fn reviewers(os_kind: OsKind) -> &'static [Reviewer] {
    match os_kind {
        OsKind::GuestOs => GUESTOS_REVIEWERS,
        OsKind::HostOs => HOSTOS_REVIEWERS,
    }
}

/// Whether changes owned by `team` are relevant to the OS images.
pub fn is_os_team(team: &str) -> bool {
    REPLICA_TEAMS.contains(&team)
}

/// Display name of a CODEOWNERS team.
pub fn pretty_team_name(team: &str) -> &str {
    match team {
        "boundary-node" | "boundarynode-team" => "Boundary Nodes",
        "consensus-owners" | "consensus" => "Consensus",
        "cross-chain-team" => "Cross Chain",
        "crypto-team" | "dept-crypto-library" => "Crypto",
        "docs-owners" => "Docs",
        "dre" | "DRE" => "DRE",
        "execution-owners" | "execution" => "Execution",
        "financial-integrations" | "finint" => "Financial Integrations",
        "ghost" => "Ghost",
        "ic-interface-owners" | "interface-owners" => "Interface",
        "ic-message-routing-owners" | "message-routing-owners" => "Message Routing",
        "ic-owners-owners" | "owners-owners" => "Owners",
        "ic-support-eu" => "SupportEU",
        "ic-support-na" => "SupportNA",
        "ic-support" => "Support",
        "ic-testing-verification" => "T&V",
        "idx" => "IDX",
        "networking-team" | "networking" => "Networking",
        "nns-team" => "NNS",
        "node-team" | "node" => "Node",
        "platform-operations" => "Platform Ops",
        "prodsec" | "product-security" => "Prodsec",
        "runtime-owners" | "runtime" => "Runtime",
        "sdk-team" => "SDK",
        "trust-team" => "Trust",
        "utopia" => "Utopia",
        "pocket-ic" => "Pocket IC",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_names() {
        assert_eq!(pretty_team_name("execution-owners"), "Execution");
        assert_eq!(pretty_team_name("node-team"), "Node");
        assert_eq!(pretty_team_name("mystery"), "mystery");
    }

    #[test]
    fn test_reviewers_per_os() {
        let guest: Vec<_> = reviewers(OsKind::GuestOs).iter().map(|r| r.handle).collect();
        assert_eq!(guest, vec!["@team-execution", "@team-messaging"]);
        assert_eq!(reviewers(OsKind::HostOs)[0].handle, "@node-team");
    }
}
