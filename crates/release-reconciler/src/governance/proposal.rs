//! Election proposals as the reconciler sees them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::OsKind;

/// A proposal already known to governance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalInfo {
    pub id: u64,
    pub version: String,
    pub os_kind: OsKind,
}

/// Known election proposals per OS kind, keyed by version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownProposals {
    pub guestos: HashMap<String, ProposalInfo>,
    pub hostos: HashMap<String, ProposalInfo>,
}

impl KnownProposals {
    pub fn insert(&mut self, proposal: ProposalInfo) {
        let map = match proposal.os_kind {
            OsKind::GuestOs => &mut self.guestos,
            OsKind::HostOs => &mut self.hostos,
        };
        map.insert(proposal.version.clone(), proposal);
    }

    pub fn get(&self, version: &str, os_kind: OsKind) -> Option<&ProposalInfo> {
        match os_kind {
            OsKind::GuestOs => self.guestos.get(version),
            OsKind::HostOs => self.hostos.get(version),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProposalInfo> {
        self.guestos.values().chain(self.hostos.values())
    }

    pub fn len(&self) -> usize {
        self.guestos.len() + self.hostos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The update image a proposal elects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePackage {
    /// SHA-256 of the update image, hex.
    pub checksum: String,
    pub urls: Vec<String>,
}

/// Everything needed to place an election proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub version: String,
    pub os_kind: OsKind,
    pub changelog: String,
    pub forum_post_url: String,
    pub unelect_versions: Vec<String>,
    pub package: ReleasePackage,
}

impl ProposalRequest {
    pub fn title(&self) -> String {
        let short = self.version.get(..7).unwrap_or(&self.version);
        match self.os_kind {
            OsKind::GuestOs => format!("Elect new IC/Replica revision (commit {})", short),
            OsKind::HostOs => format!("Elect new HostOS revision (commit {})", short),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{}\n\nLink to the forum post: {}",
            self.changelog, self.forum_post_url
        )
    }
}
