//! Update-image locations and checksums for a version.

use async_trait::async_trait;
use reqwest::Client;

use super::error::{GovernanceError, Result};
use super::proposal::ReleasePackage;
use crate::http::{check_status, create_http_client, HttpError};
use crate::retry::{retry_transient, RetryPolicy};
use crate::types::OsKind;

const CDN_HOSTS: &[&str] = &["download.dfinity.systems", "download.dfinity.network"];
const UPDATE_IMAGE: &str = "update-img.tar.zst";

#[async_trait]
pub trait PackageSource: Send + Sync {
    async fn package(&self, version: &str, os_kind: OsKind) -> Result<ReleasePackage>;
}

/// Mirrors the update image of `version` is served from.
pub fn package_urls(version: &str, os_kind: OsKind) -> Vec<String> {
    CDN_HOSTS
        .iter()
        .map(|host| {
            format!(
                "https://{}/ic/{}/{}/update-img/{}",
                host,
                version,
                os_kind.package_dir(),
                UPDATE_IMAGE
            )
        })
        .collect()
}

fn checksums_url(version: &str, os_kind: OsKind) -> String {
    format!(
        "https://{}/ic/{}/{}/update-img/SHA256SUMS",
        CDN_HOSTS[0],
        version,
        os_kind.package_dir()
    )
}

/// The update image's hash from a `SHA256SUMS` listing.
pub fn checksum_from_sums(sums: &str) -> Option<String> {
    sums.lines()
        .map(str::trim)
        .find(|line| line.ends_with(UPDATE_IMAGE))
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_string)
}

/// Packages published on the download CDN.
pub struct CdnPackages {
    client: Client,
    retry: RetryPolicy,
}

impl CdnPackages {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: create_http_client()?,
            retry: RetryPolicy::default(),
        })
    }
}

#[async_trait]
impl PackageSource for CdnPackages {
    async fn package(&self, version: &str, os_kind: OsKind) -> Result<ReleasePackage> {
        let url = checksums_url(version, os_kind);
        let url_ref = url.as_str();
        let client = &self.client;
        let sums = retry_transient(self.retry, url_ref, || async move {
            let response = client
                .get(url_ref)
                .send()
                .await
                .map_err(|e| HttpError::from_reqwest(url_ref, e))?;
            check_status(url_ref, response)
                .await?
                .text()
                .await
                .map_err(|e| HttpError::from_reqwest(url_ref, e))
        })
        .await?;

        let checksum = checksum_from_sums(&sums).ok_or_else(|| GovernanceError::MissingChecksum {
            version: version.to_string(),
            url: url.clone(),
        })?;
        Ok(ReleasePackage {
            checksum,
            urls: package_urls(version, os_kind),
        })
    }
}

/// Fixed checksums, for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticPackages {
    checksum: String,
}

impl StaticPackages {
    pub fn new(checksum: impl Into<String>) -> Self {
        Self {
            checksum: checksum.into(),
        }
    }
}

#[async_trait]
impl PackageSource for StaticPackages {
    async fn package(&self, version: &str, os_kind: OsKind) -> Result<ReleasePackage> {
        Ok(ReleasePackage {
            checksum: self.checksum.clone(),
            urls: package_urls(version, os_kind),
        })
    }
}
