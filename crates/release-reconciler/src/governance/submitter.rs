//! Placing election proposals through the `dre` command-line tool.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::process::Command;

use super::error::{GovernanceError, Result};
use super::proposal::ProposalRequest;
use crate::types::OsKind;

pub const DEFAULT_DRE_BINARY: &str = "dre";
const DEFAULT_CLI_TIMEOUT: Duration = Duration::from_secs(300);

static RE_PROPOSAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)proposal[^0-9\n]*?(\d+)").unwrap());
static RE_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-f]{40}$").unwrap());

#[async_trait]
pub trait ProposalSubmitter: Send + Sync {
    /// Places the proposal and returns its id. Any error may have left a
    /// proposal behind.
    async fn submit(&self, request: &ProposalRequest) -> Result<u64>;

    /// Versions currently elected for `os_kind`.
    async fn blessed_versions(&self, os_kind: OsKind) -> Result<Vec<String>>;
}

/// Neuron credentials for proposal submission.
#[derive(Debug, Clone)]
pub struct DreAuth {
    pub key_path: PathBuf,
    pub neuron_id: String,
}

pub struct DreCli {
    binary: PathBuf,
    auth: Option<DreAuth>,
    timeout: Duration,
}

impl DreCli {
    pub fn new(binary: impl Into<PathBuf>, auth: Option<DreAuth>) -> Self {
        Self {
            binary: binary.into(),
            auth,
            timeout: DEFAULT_CLI_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn auth_args(&self) -> Vec<String> {
        match &self.auth {
            Some(auth) => vec![
                "--private-key-pem".to_string(),
                auth.key_path.display().to_string(),
                "--neuron-id".to_string(),
                auth.neuron_id.clone(),
            ],
            None => Vec::new(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        let command = format!(
            "{} {}",
            self.binary.display(),
            args.iter().take(2).cloned().collect::<Vec<_>>().join(" ")
        );
        log::debug!("Running {}", command);

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| GovernanceError::CliTimeout {
                command: command.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| GovernanceError::Cli {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(GovernanceError::Cli {
                command,
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

/// Command-line arguments placing `request`, without credentials.
pub fn propose_args(request: &ProposalRequest) -> Vec<String> {
    let (subcommand, elect_flag, unelect_flag) = match request.os_kind {
        OsKind::GuestOs => (
            "update-elected-replica-versions",
            "--replica-version-to-elect",
            "--replica-versions-to-unelect",
        ),
        OsKind::HostOs => (
            "update-elected-hostos-versions",
            "--hostos-version-to-elect",
            "--hostos-versions-to-unelect",
        ),
    };
    let mut args: Vec<String> = vec![
        "propose".into(),
        subcommand.into(),
        "--proposal-title".into(),
        request.title(),
        "--summary".into(),
        request.summary(),
        "--release-package-sha256-hex".into(),
        request.package.checksum.clone(),
        "--release-package-urls".into(),
    ];
    args.extend(request.package.urls.iter().cloned());
    args.push(elect_flag.into());
    args.push(request.version.clone());
    if !request.unelect_versions.is_empty() {
        args.push(unelect_flag.into());
        args.extend(request.unelect_versions.iter().cloned());
    }
    args
}

pub fn parse_proposal_id(output: &str) -> Option<u64> {
    RE_PROPOSAL_ID
        .captures_iter(output)
        .filter_map(|c| c[1].parse().ok())
        .last()
}

/// Every commit id anywhere in the JSON the CLI prints.
fn collect_versions(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if RE_VERSION.is_match(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_versions(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_versions(v, out)),
        _ => {}
    }
}

pub fn parse_blessed_versions(output: &str) -> Result<Vec<String>> {
    let value: Value =
        serde_json::from_str(output.trim()).map_err(|e| GovernanceError::UnexpectedOutput {
            command: "get blessed versions".to_string(),
            output: e.to_string(),
        })?;
    let mut versions = Vec::new();
    collect_versions(&value, &mut versions);
    versions.dedup();
    Ok(versions)
}

#[async_trait]
impl ProposalSubmitter for DreCli {
    async fn submit(&self, request: &ProposalRequest) -> Result<u64> {
        let mut args = vec!["--yes".to_string()];
        args.extend(self.auth_args());
        args.extend(propose_args(request));

        log::info!(
            "Submitting proposal for {} version {}",
            request.os_kind,
            request.version
        );
        let output = self.run(&args).await?;
        parse_proposal_id(&output).ok_or_else(|| GovernanceError::UnexpectedOutput {
            command: "propose".to_string(),
            output: output.trim().chars().take(300).collect(),
        })
    }

    async fn blessed_versions(&self, os_kind: OsKind) -> Result<Vec<String>> {
        let what = match os_kind {
            OsKind::GuestOs => "blessed-replica-versions",
            OsKind::HostOs => "elected-hostos-versions",
        };
        let args = ["get", what, "--json"].map(String::from);
        let output = self.run(&args).await?;
        parse_blessed_versions(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::proposal::ReleasePackage;

    fn request(os_kind: OsKind, unelect: Vec<String>) -> ProposalRequest {
        ProposalRequest {
            version: "b".repeat(40),
            os_kind,
            changelog: "notes".to_string(),
            forum_post_url: "https://forum.example.org/t/x/1/2".to_string(),
            unelect_versions: unelect,
            package: ReleasePackage {
                checksum: "ff".to_string(),
                urls: vec!["https://a".to_string(), "https://b".to_string()],
            },
        }
    }

    #[test]
    fn test_guestos_args() {
        let args = propose_args(&request(OsKind::GuestOs, vec!["a".repeat(40)]));
        assert_eq!(args[0], "propose");
        assert_eq!(args[1], "update-elected-replica-versions");
        let urls = args.iter().position(|a| a == "--release-package-urls").unwrap();
        assert_eq!(args[urls + 1..urls + 3], ["https://a", "https://b"]);
        assert_eq!(args[urls + 3], "--replica-version-to-elect");
        assert_eq!(args[urls + 5], "--replica-versions-to-unelect");
        assert_eq!(args.last().unwrap(), &"a".repeat(40));
    }

    #[test]
    fn test_hostos_args_without_unelection() {
        let args = propose_args(&request(OsKind::HostOs, Vec::new()));
        assert_eq!(args[1], "update-elected-hostos-versions");
        assert!(args.contains(&"--hostos-version-to-elect".to_string()));
        assert!(!args.iter().any(|a| a.ends_with("-to-unelect")));
        assert!(args.contains(&"Elect new HostOS revision (commit bbbbbbb)".to_string()));
    }

    #[test]
    fn test_parse_proposal_id() {
        assert_eq!(parse_proposal_id("Submitted proposal with ID 134567\n"), Some(134567));
        assert_eq!(parse_proposal_id("proposal 12"), Some(12));
        assert_eq!(parse_proposal_id("no id here"), None);
    }

    #[test]
    fn test_parse_blessed_versions_any_shape() {
        let a = "a".repeat(40);
        let b = "b".repeat(40);
        let flat = format!(r#"["{}", "{}"]"#, a, b);
        assert_eq!(parse_blessed_versions(&flat).unwrap(), vec![a.clone(), b.clone()]);
        let nested = format!(r#"{{"value": {{"blessed_version_ids": ["{}"]}}, "version": 3}}"#, a);
        assert_eq!(parse_blessed_versions(&nested).unwrap(), vec![a]);
        assert!(parse_blessed_versions("not json").is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let cli = DreCli::new("/nonexistent/dre", None);
        let err = cli.blessed_versions(OsKind::GuestOs).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Cli { .. }));
    }
}
