//! Governance simulated on local disk.
//!
//! Submitted proposals persist to `proposals.json` and are reported back by
//! the observer side, the way a real proposal would show up on the dashboard.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::{GovernanceError, Result};
use super::observer::GovernanceObserver;
use super::proposal::{KnownProposals, ProposalInfo, ProposalRequest};
use super::submitter::ProposalSubmitter;
use crate::types::OsKind;

pub const PROPOSALS_FILE: &str = "proposals.json";
const FIRST_PROPOSAL_ID: u64 = 1001;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProposal {
    pub id: u64,
    pub request: ProposalRequest,
}

/// How a simulated submission goes wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitFailure {
    /// Nothing is placed.
    Reject,
    /// The proposal is placed but the caller sees an error.
    LeakProposal,
}

#[derive(Default)]
struct Simulation {
    proposals: Vec<StoredProposal>,
    blessed: HashMap<OsKind, Vec<String>>,
    running: HashMap<OsKind, Vec<String>>,
    failures: HashMap<(String, OsKind), SubmitFailure>,
    attempts: usize,
}

pub struct DryRunGovernance {
    storage: Option<PathBuf>,
    sim: Mutex<Simulation>,
}

impl DryRunGovernance {
    pub fn in_memory() -> Self {
        Self {
            storage: None,
            sim: Mutex::new(Simulation::default()),
        }
    }

    pub fn open(folder: impl Into<PathBuf>) -> Result<Self> {
        let folder = folder.into();
        let file = folder.join(PROPOSALS_FILE);
        let proposals = if file.exists() {
            let data = std::fs::read(&file).map_err(|e| GovernanceError::storage(&file, e))?;
            serde_json::from_slice(&data).map_err(|e| GovernanceError::storage(&file, e))?
        } else {
            Vec::new()
        };
        Ok(Self {
            storage: Some(folder),
            sim: Mutex::new(Simulation {
                proposals,
                ..Default::default()
            }),
        })
    }

    fn with_sim<T>(&self, f: impl FnOnce(&mut Simulation) -> T) -> T {
        let mut sim = self.sim.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut sim)
    }

    pub fn set_blessed(&self, os_kind: OsKind, versions: Vec<String>) {
        self.with_sim(|sim| sim.blessed.insert(os_kind, versions));
    }

    pub fn set_running(&self, os_kind: OsKind, versions: Vec<String>) {
        self.with_sim(|sim| sim.running.insert(os_kind, versions));
    }

    /// Makes every submission for the pair fail until cleared.
    pub fn fail_submissions(&self, version: &str, os_kind: OsKind, failure: SubmitFailure) {
        self.with_sim(|sim| sim.failures.insert((version.to_string(), os_kind), failure));
    }

    pub fn clear_failures(&self) {
        self.with_sim(|sim| sim.failures.clear());
    }

    pub fn proposals(&self) -> Vec<StoredProposal> {
        self.with_sim(|sim| sim.proposals.clone())
    }

    /// Submission calls so far, failed ones included.
    pub fn submit_attempts(&self) -> usize {
        self.with_sim(|sim| sim.attempts)
    }
}

fn persist(folder: &Path, proposals: &[StoredProposal]) -> Result<()> {
    let file = folder.join(PROPOSALS_FILE);
    std::fs::create_dir_all(folder).map_err(|e| GovernanceError::storage(folder, e))?;
    let data =
        serde_json::to_vec_pretty(proposals).map_err(|e| GovernanceError::storage(&file, e))?;
    std::fs::write(&file, data).map_err(|e| GovernanceError::storage(&file, e))
}

#[async_trait]
impl ProposalSubmitter for DryRunGovernance {
    async fn submit(&self, request: &ProposalRequest) -> Result<u64> {
        let mut sim = self.sim.lock().unwrap_or_else(|p| p.into_inner());
        sim.attempts += 1;
        let failure = sim
            .failures
            .get(&(request.version.clone(), request.os_kind))
            .copied();
        if failure == Some(SubmitFailure::Reject) {
            return Err(GovernanceError::Cli {
                command: "propose".to_string(),
                message: "simulated failure".to_string(),
            });
        }

        let id = FIRST_PROPOSAL_ID + sim.proposals.len() as u64;
        log::warn!(
            "Would submit proposal '{}' as {}",
            request.title(),
            id
        );
        sim.proposals.push(StoredProposal {
            id,
            request: request.clone(),
        });
        if let Some(folder) = &self.storage {
            persist(folder, &sim.proposals)?;
        }

        if failure == Some(SubmitFailure::LeakProposal) {
            return Err(GovernanceError::CliTimeout {
                command: "propose".to_string(),
                secs: 0,
            });
        }
        Ok(id)
    }

    async fn blessed_versions(&self, os_kind: OsKind) -> Result<Vec<String>> {
        Ok(self.with_sim(|sim| sim.blessed.get(&os_kind).cloned().unwrap_or_default()))
    }
}

#[async_trait]
impl GovernanceObserver for DryRunGovernance {
    async fn known_proposals(&self) -> Result<KnownProposals> {
        Ok(self.with_sim(|sim| {
            let mut known = KnownProposals::default();
            for stored in &sim.proposals {
                known.insert(ProposalInfo {
                    id: stored.id,
                    version: stored.request.version.clone(),
                    os_kind: stored.request.os_kind,
                });
            }
            known
        }))
    }

    async fn running_versions(&self, os_kind: OsKind) -> Result<Option<Vec<String>>> {
        Ok(self.with_sim(|sim| sim.running.get(&os_kind).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::proposal::ReleasePackage;
    use tempfile::TempDir;

    fn request(version: &str, os_kind: OsKind) -> ProposalRequest {
        ProposalRequest {
            version: version.to_string(),
            os_kind,
            changelog: "notes".to_string(),
            forum_post_url: "u".to_string(),
            unelect_versions: Vec::new(),
            package: ReleasePackage {
                checksum: "00".to_string(),
                urls: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_submissions_are_observed_and_persisted() {
        let tmp = TempDir::new().unwrap();
        let gov = DryRunGovernance::open(tmp.path()).unwrap();
        assert_eq!(gov.submit(&request("a", OsKind::GuestOs)).await.unwrap(), 1001);
        assert_eq!(gov.submit(&request("a", OsKind::HostOs)).await.unwrap(), 1002);

        let reopened = DryRunGovernance::open(tmp.path()).unwrap();
        let known = reopened.known_proposals().await.unwrap();
        assert_eq!(known.get("a", OsKind::GuestOs).map(|p| p.id), Some(1001));
        assert_eq!(known.get("a", OsKind::HostOs).map(|p| p.id), Some(1002));
    }

    #[tokio::test]
    async fn test_failure_modes() {
        let gov = DryRunGovernance::in_memory();
        gov.fail_submissions("a", OsKind::GuestOs, SubmitFailure::Reject);
        gov.fail_submissions("b", OsKind::GuestOs, SubmitFailure::LeakProposal);

        assert!(gov.submit(&request("a", OsKind::GuestOs)).await.is_err());
        assert!(gov.submit(&request("b", OsKind::GuestOs)).await.is_err());
        assert_eq!(gov.submit_attempts(), 2);

        let known = gov.known_proposals().await.unwrap();
        assert!(known.get("a", OsKind::GuestOs).is_none());
        assert_eq!(known.get("b", OsKind::GuestOs).map(|p| p.id), Some(1001));

        gov.clear_failures();
        assert_eq!(gov.submit(&request("a", OsKind::GuestOs)).await.unwrap(), 1002);
    }

    #[tokio::test]
    async fn test_running_versions_unknown_until_set() {
        let gov = DryRunGovernance::in_memory();
        assert_eq!(gov.running_versions(OsKind::GuestOs).await.unwrap(), None);
        gov.set_running(OsKind::GuestOs, vec!["v".to_string()]);
        assert_eq!(
            gov.running_versions(OsKind::GuestOs).await.unwrap(),
            Some(vec!["v".to_string()])
        );
    }
}
