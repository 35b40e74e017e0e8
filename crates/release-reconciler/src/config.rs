//! Launcher configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::forum::{DEFAULT_CATEGORY_ID, DEFAULT_TOPIC_TTL};
use crate::governance::{DreAuth, DEFAULT_DRE_BINARY};
use crate::publish::DEFAULT_PUBLISH_REPO;
use crate::secrets::{SecretError, SecretSource};
use crate::watchdog::default_timeout;

pub const DEFAULT_IC_REPO_URL: &str = "https://github.com/dfinity/ic.git";
pub const DEFAULT_INDEX_REPO_URL: &str = "https://github.com/dfinity/dre.git";
pub const DEFAULT_ANNOTATOR_URL: &str = "http://localhost:9469/";
const DEFAULT_LOOP_EVERY_SECS: i64 = 60;
const APP_DIR: &str = "release-reconciler";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Secret(#[from] SecretError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Where commit verdicts come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotatorSource {
    /// A commit-annotator HTTP service.
    Remote(String),
    /// Notes in the local mirror.
    LocalNotes,
    /// Computed on demand with the build tools.
    Recompute,
}

#[derive(Debug)]
pub struct ForumSettings {
    pub url: Option<String>,
    pub user: Option<String>,
    pub api_key: Option<SecretString>,
    pub category_id: u64,
    pub topic_ttl: Duration,
}

#[derive(Debug)]
pub struct ReconcilerConfig {
    pub dry_run: bool,
    /// `None` runs a single pass.
    pub loop_every: Option<Duration>,
    pub watchdog_timeout: Duration,
    pub skip_preloading_state: bool,
    pub ignore_releases: Vec<String>,
    pub state_path: PathBuf,
    pub cache_dir: PathBuf,
    pub dry_run_storage: PathBuf,
    pub ic_repo_url: String,
    pub index_repo_url: String,
    pub index_path: Option<PathBuf>,
    pub annotator: AnnotatorSource,
    pub forum: ForumSettings,
    pub gdocs_folder_id: Option<String>,
    pub gdocs_token: Option<SecretString>,
    pub github_token: Option<SecretString>,
    pub publish_repo: String,
    pub proposer: Option<DreAuth>,
    pub dre_path: PathBuf,
    pub bazel_path: Option<PathBuf>,
    pub target_determinator_path: Option<PathBuf>,
}

fn parse_bool(name: &str, value: Option<String>) -> Result<bool> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value,
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name: name.to_string(),
            value: v.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_annotator(value: Option<String>) -> AnnotatorSource {
    match value.as_deref().map(str::trim) {
        None | Some("") => AnnotatorSource::Remote(DEFAULT_ANNOTATOR_URL.to_string()),
        Some("local") => AnnotatorSource::LocalNotes,
        Some("recompute") | Some("recreate") => AnnotatorSource::Recompute,
        Some(url) => AnnotatorSource::Remote(url.to_string()),
    }
}

fn default_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(std::env::temp_dir).join(APP_DIR)
}

impl ReconcilerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Builds the configuration from any variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let dry_run = parse_bool("RECONCILER_DRY_RUN", lookup("RECONCILER_DRY_RUN"))?;
        let loop_secs: i64 = parse_number(
            "RECONCILER_LOOP_EVERY_SECS",
            lookup("RECONCILER_LOOP_EVERY_SECS"),
            DEFAULT_LOOP_EVERY_SECS,
        )?;
        let loop_every = (loop_secs > 0).then(|| Duration::from_secs(loop_secs as u64));
        let watchdog_timeout = match lookup("RECONCILER_WATCHDOG_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number(
                "RECONCILER_WATCHDOG_TIMEOUT_SECS",
                Some(v),
                0u64,
            )?),
            None => default_timeout(loop_every.unwrap_or_default()),
        };

        let cache_dir = lookup("RECONCILER_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_dir(dirs::cache_dir()));
        let state_path = lookup("RECONCILER_STATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_dir(dirs::data_dir()).join("state.json"));
        let dry_run_storage = lookup("RECONCILER_DRY_RUN_STORAGE")
            .map(PathBuf::from)
            .unwrap_or_else(|| cache_dir.join("dry-run"));

        let secret = |what: &str, var: &str| {
            SecretSource::new(what)
                .direct(lookup(var))
                .file(lookup(&format!("{}_FILE", var)))
                .resolve_optional()
        };

        let proposer = match (lookup("PROPOSER_KEY_FILE"), lookup("PROPOSER_NEURON_ID")) {
            (Some(key), Some(neuron)) => Some(DreAuth {
                key_path: PathBuf::from(key),
                neuron_id: neuron,
            }),
            _ => None,
        };

        let config = Self {
            dry_run,
            loop_every,
            watchdog_timeout,
            skip_preloading_state: parse_bool(
                "RECONCILER_SKIP_PRELOADING_STATE",
                lookup("RECONCILER_SKIP_PRELOADING_STATE"),
            )?,
            ignore_releases: parse_list(lookup("RECONCILER_IGNORE_RELEASES")),
            state_path,
            cache_dir,
            dry_run_storage,
            ic_repo_url: lookup("IC_REPO_URL").unwrap_or_else(|| DEFAULT_IC_REPO_URL.to_string()),
            index_repo_url: lookup("RELEASE_INDEX_REPO_URL")
                .unwrap_or_else(|| DEFAULT_INDEX_REPO_URL.to_string()),
            index_path: lookup("RELEASE_INDEX_PATH").map(PathBuf::from),
            annotator: parse_annotator(lookup("COMMIT_ANNOTATOR_URL")),
            forum: ForumSettings {
                url: lookup("DISCOURSE_URL"),
                user: lookup("DISCOURSE_USER"),
                api_key: secret("forum API key", "DISCOURSE_KEY")?,
                category_id: parse_number(
                    "DISCOURSE_CATEGORY_ID",
                    lookup("DISCOURSE_CATEGORY_ID"),
                    DEFAULT_CATEGORY_ID,
                )?,
                topic_ttl: Duration::from_secs(parse_number(
                    "DISCOURSE_TOPIC_GET_TTL_SECS",
                    lookup("DISCOURSE_TOPIC_GET_TTL_SECS"),
                    DEFAULT_TOPIC_TTL.as_secs(),
                )?),
            },
            gdocs_folder_id: lookup("GDOCS_FOLDER_ID"),
            gdocs_token: secret("document service token", "GDOCS_TOKEN")?,
            github_token: secret("GitHub token", "GITHUB_TOKEN")?,
            publish_repo: lookup("PUBLISH_REPO").unwrap_or_else(|| DEFAULT_PUBLISH_REPO.to_string()),
            proposer,
            dre_path: lookup("DRE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DRE_BINARY)),
            bazel_path: lookup("BAZEL_PATH").map(PathBuf::from),
            target_determinator_path: lookup("TARGET_DETERMINATOR_PATH").map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.skip_preloading_state && !self.dry_run {
            return Err(ConfigError::Validation {
                message: "preloading state may only be skipped in dry-run mode, \
                          otherwise proposals could be submitted twice"
                    .to_string(),
            });
        }
        if self.dry_run {
            return Ok(());
        }

        let mut missing = Vec::new();
        if self.forum.url.is_none() {
            missing.push("DISCOURSE_URL");
        }
        if self.forum.user.is_none() {
            missing.push("DISCOURSE_USER");
        }
        if self.forum.api_key.is_none() {
            missing.push("DISCOURSE_KEY");
        }
        if self.gdocs_folder_id.is_none() {
            missing.push("GDOCS_FOLDER_ID");
        }
        if self.gdocs_token.is_none() {
            missing.push("GDOCS_TOKEN");
        }
        if self.github_token.is_none() {
            missing.push("GITHUB_TOKEN");
        }
        if self.proposer.is_none() {
            missing.push("PROPOSER_KEY_FILE/PROPOSER_NEURON_ID");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Validation {
                message: format!("live mode requires {}", missing.join(", ")),
            });
        }
        Ok(())
    }
}
