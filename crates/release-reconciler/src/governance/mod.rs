//! Governance: observing election proposals and placing new ones.

pub mod dryrun;
pub mod error;
pub mod observer;
pub mod packages;
pub mod proposal;
pub mod submitter;

pub use dryrun::{DryRunGovernance, StoredProposal, SubmitFailure, PROPOSALS_FILE};
pub use error::{GovernanceError, Result};
pub use observer::{DashboardObserver, GovernanceObserver, DASHBOARD_API};
pub use packages::{package_urls, CdnPackages, PackageSource, StaticPackages};
pub use proposal::{KnownProposals, ProposalInfo, ProposalRequest, ReleasePackage};
pub use submitter::{DreAuth, DreCli, ProposalSubmitter, DEFAULT_DRE_BINARY};
