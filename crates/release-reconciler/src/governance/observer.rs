//! What governance already knows: placed proposals and running versions.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::error::Result;
use super::proposal::{KnownProposals, ProposalInfo};
use crate::http::{check_status, create_http_client, HttpError};
use crate::retry::{retry_transient, RetryPolicy};
use crate::types::OsKind;

pub const DASHBOARD_API: &str = "https://ic-api.internetcomputer.org/api/v3";
const PROPOSAL_LIMIT: u32 = 50;

#[async_trait]
pub trait GovernanceObserver: Send + Sync {
    /// Recent OS election proposals, partitioned by OS kind.
    async fn known_proposals(&self) -> Result<KnownProposals>;

    /// Versions currently running on the network, or `None` if the observer
    /// cannot tell for this OS kind.
    async fn running_versions(&self, os_kind: OsKind) -> Result<Option<Vec<String>>>;
}

#[derive(Deserialize)]
struct ProposalList {
    #[serde(default)]
    data: Vec<DashboardProposal>,
}

#[derive(Deserialize)]
struct DashboardProposal {
    proposal_id: u64,
    #[serde(default)]
    payload: Value,
}

impl DashboardProposal {
    fn election(&self) -> Option<ProposalInfo> {
        let elected = |key: &str| {
            self.payload
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let (version, os_kind) = match elected("replica_version_to_elect") {
            Some(v) => (v, OsKind::GuestOs),
            None => (elected("hostos_version_to_elect")?, OsKind::HostOs),
        };
        Some(ProposalInfo {
            id: self.proposal_id,
            version,
            os_kind,
        })
    }
}

fn partition(list: ProposalList) -> KnownProposals {
    let mut known = KnownProposals::default();
    for proposal in list.data.iter().filter_map(DashboardProposal::election) {
        known.insert(proposal);
    }
    known
}

#[derive(Deserialize)]
struct SubnetList {
    #[serde(default)]
    subnets: Vec<Subnet>,
}

#[derive(Deserialize)]
struct Subnet {
    #[serde(default)]
    replica_version_id: Option<String>,
}

/// Reads the public governance dashboard.
pub struct DashboardObserver {
    base_url: String,
    client: Client,
    retry: RetryPolicy,
}

impl DashboardObserver {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DASHBOARD_API)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: create_http_client()?,
            retry: RetryPolicy::default(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned + Send>(&self, url: &str) -> Result<T> {
        let client = &self.client;
        let value = retry_transient(self.retry, url, || async move {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| HttpError::from_reqwest(url, e))?;
            check_status(url, response)
                .await?
                .json::<T>()
                .await
                .map_err(|e| HttpError::from_reqwest(url, e))
        })
        .await?;
        Ok(value)
    }
}

#[async_trait]
impl GovernanceObserver for DashboardObserver {
    async fn known_proposals(&self) -> Result<KnownProposals> {
        let url = format!(
            "{}/proposals?limit={}&include_topic=TOPIC_IC_OS_VERSION_ELECTION",
            self.base_url, PROPOSAL_LIMIT
        );
        let list: ProposalList = self.get(&url).await?;
        Ok(partition(list))
    }

    async fn running_versions(&self, os_kind: OsKind) -> Result<Option<Vec<String>>> {
        if os_kind == OsKind::HostOs {
            return Ok(None);
        }
        let url = format!("{}/subnets", self.base_url);
        let list: SubnetList = self.get(&url).await?;
        let mut versions: Vec<String> = list
            .subnets
            .into_iter()
            .filter_map(|s| s.replica_version_id)
            .collect();
        versions.sort();
        versions.dedup();
        Ok(Some(versions))
    }
}
