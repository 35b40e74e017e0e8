//! Persisted proposal state per (version, OS kind).
//!
//! The whole map is rewritten on every change through a temporary file in
//! the same directory that is then renamed over the old one, so a crash
//! never leaves a half-written state behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::governance::KnownProposals;
use crate::types::OsKind;

/// A failed submission is not retried for this long.
pub const MALFUNCTION_RETRY_MINUTES: i64 = 10;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to access state file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StateError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalState {
    None,
    Submitted {
        proposal_id: u64,
        timestamp: DateTime<Utc>,
    },
    /// Submission failed and may or may not have placed a proposal.
    Malfunction { timestamp: DateTime<Utc> },
}

impl ProposalState {
    pub fn proposal_id(&self) -> Option<u64> {
        match self {
            ProposalState::Submitted { proposal_id, .. } => Some(*proposal_id),
            _ => None,
        }
    }

    /// False only for a malfunction younger than the retry window.
    pub fn ready_to_retry(&self, now: DateTime<Utc>) -> bool {
        match self {
            ProposalState::Malfunction { timestamp } => {
                now - *timestamp >= Duration::minutes(MALFUNCTION_RETRY_MINUTES)
            }
            ProposalState::Submitted { .. } => false,
            ProposalState::None => true,
        }
    }
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProposalState::None => write!(f, "no proposal"),
            ProposalState::Submitted { proposal_id, .. } => {
                write!(f, "proposal {} submitted", proposal_id)
            }
            ProposalState::Malfunction { timestamp } => {
                write!(f, "submission failed at {}", timestamp.to_rfc3339())
            }
        }
    }
}

pub fn state_key(version: &str, os_kind: OsKind) -> String {
    format!("{}+{}", version, os_kind)
}

#[derive(Debug, Default)]
pub struct ReconcilerState {
    path: Option<PathBuf>,
    entries: BTreeMap<String, ProposalState>,
}

impl ReconcilerState {
    /// State that is never written anywhere.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the state at `path`; a missing file is an empty state.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let data = std::fs::read(&path).map_err(|source| StateError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_slice(&data).map_err(|source| StateError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, version: &str, os_kind: OsKind) -> ProposalState {
        self.entries
            .get(&state_key(version, os_kind))
            .copied()
            .unwrap_or(ProposalState::None)
    }

    pub fn entries(&self) -> &BTreeMap<String, ProposalState> {
        &self.entries
    }

    pub fn record_submission(
        &mut self,
        version: &str,
        os_kind: OsKind,
        proposal_id: u64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.set(
            version,
            os_kind,
            ProposalState::Submitted {
                proposal_id,
                timestamp: at,
            },
        )
    }

    pub fn record_malfunction(
        &mut self,
        version: &str,
        os_kind: OsKind,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.set(version, os_kind, ProposalState::Malfunction { timestamp: at })
    }

    /// Records every known proposal not yet recorded as submitted. Returns
    /// how many entries changed.
    pub fn seed(&mut self, known: &KnownProposals, at: DateTime<Utc>) -> Result<usize> {
        let mut changed = 0;
        for proposal in known.iter() {
            let key = state_key(&proposal.version, proposal.os_kind);
            if let Some(ProposalState::Submitted { .. }) = self.entries.get(&key) {
                continue;
            }
            log::debug!(
                "Recording known proposal {} for {} {}",
                proposal.id,
                proposal.version,
                proposal.os_kind
            );
            self.entries.insert(
                key,
                ProposalState::Submitted {
                    proposal_id: proposal.id,
                    timestamp: at,
                },
            );
            changed += 1;
        }
        if changed > 0 {
            self.persist()?;
        }
        Ok(changed)
    }

    fn set(&mut self, version: &str, os_kind: OsKind, state: ProposalState) -> Result<()> {
        self.entries.insert(state_key(version, os_kind), state);
        self.persist()
    }

    /// Atomically rewrites the state file.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source: std::io::Error| StateError::Io {
            path: path.clone(),
            source,
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let data = serde_json::to_vec_pretty(&self.entries).map_err(|source| StateError::Parse {
            path: path.clone(),
            source,
        })?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&data).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}
