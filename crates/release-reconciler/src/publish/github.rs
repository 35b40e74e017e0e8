//! Pull requests against the canonical repository through the GitHub REST API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{PublishError, Result};
use super::publisher::{
    branch_name, changelog_path, published_url, pull_request_title, ChangelogPublisher,
    PublishedChangelog, PUBLISH_BASE_BRANCH,
};
use crate::http::{check_status, create_http_client, HttpError};
use crate::retry::{retry_transient, RetryPolicy};
use crate::types::OsKind;

const GITHUB_API: &str = "https://api.github.com";

#[derive(Deserialize)]
struct PullRequest {
    number: u64,
}

#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

pub struct GitHubPublisher {
    repo: String,
    owner: String,
    token: SecretString,
    client: Client,
    retry: RetryPolicy,
}

impl GitHubPublisher {
    /// `repo` is `owner/name`.
    pub fn new(repo: impl Into<String>, token: SecretString) -> Result<Self> {
        let repo = repo.into();
        let owner = match repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => owner.to_string(),
            _ => return Err(PublishError::InvalidRepository(repo)),
        };
        Ok(Self {
            repo,
            owner,
            token,
            client: create_http_client()?,
            retry: RetryPolicy::default(),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(self.token.expose_secret())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> std::result::Result<T, HttpError> {
        retry_transient(self.retry, url, || {
            let method = method.clone();
            async move {
                let mut builder = self.request(method, url);
                if let Some(body) = body {
                    builder = builder.json(body);
                }
                let response = builder
                    .send()
                    .await
                    .map_err(|e| HttpError::from_reqwest(url, e))?;
                check_status(url, response)
                    .await?
                    .json::<T>()
                    .await
                    .map_err(|e| HttpError::from_reqwest(url, e))
            }
        })
        .await
    }

    async fn pull_requests_for(&self, branch: &str) -> Result<Vec<PullRequest>> {
        let url = format!(
            "{}/repos/{}/pulls?head={}:{}&state=all",
            GITHUB_API, self.repo, self.owner, branch
        );
        Ok(self.send_json(Method::GET, &url, None).await?)
    }

    async fn create_branch(&self, branch: &str) -> Result<()> {
        let url = format!(
            "{}/repos/{}/git/ref/heads/{}",
            GITHUB_API, self.repo, PUBLISH_BASE_BRANCH
        );
        let base: GitRef = self.send_json(Method::GET, &url, None).await?;

        let url = format!("{}/repos/{}/git/refs", GITHUB_API, self.repo);
        let body = json!({ "ref": format!("refs/heads/{}", branch), "sha": base.object.sha });
        match self.send_json::<Value>(Method::POST, &url, Some(&body)).await {
            Ok(_) => Ok(()),
            // left behind by an interrupted earlier pass
            Err(HttpError::Status { status: 422, .. }) => {
                log::info!("Branch {} already exists", branch);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn add_file(&self, branch: &str, path: &str, version: &str, changelog: &str) -> Result<()> {
        let url = format!("{}/repos/{}/contents/{}", GITHUB_API, self.repo, path);
        let body = json!({
            "message": pull_request_title(version),
            "content": BASE64.encode(changelog),
            "branch": branch,
        });
        match self.send_json::<Value>(Method::PUT, &url, Some(&body)).await {
            Ok(_) => Ok(()),
            Err(HttpError::Status { status: 422, .. }) => {
                log::warn!("File {} already exists on branch {}", path, branch);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ChangelogPublisher for GitHubPublisher {
    async fn ensure_published(
        &self,
        version: &str,
        os_kind: OsKind,
        changelog: &str,
    ) -> Result<PublishedChangelog> {
        let branch = branch_name(version, os_kind);
        let url = published_url(&self.repo, version, os_kind);
        if !self.pull_requests_for(&branch).await?.is_empty() {
            return Ok(PublishedChangelog { url, opened: false });
        }

        log::info!("Creating branch {} for version {}", branch, version);
        self.create_branch(&branch).await?;
        let path = changelog_path(version, os_kind);
        log::info!("Adding {} on branch {}", path, branch);
        self.add_file(&branch, &path, version, changelog).await?;

        let pulls_url = format!("{}/repos/{}/pulls", GITHUB_API, self.repo);
        let body = json!({
            "title": pull_request_title(version),
            "head": branch,
            "base": PUBLISH_BASE_BRANCH,
        });
        let pull: PullRequest = self.send_json(Method::POST, &pulls_url, Some(&body)).await?;
        log::info!("Opened pull request #{} for version {}", pull.number, version);
        Ok(PublishedChangelog { url, opened: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_must_name_owner() {
        let token = || SecretString::from("t".to_string());
        assert!(matches!(
            GitHubPublisher::new("dre", token()),
            Err(PublishError::InvalidRepository(_))
        ));
        let publisher = GitHubPublisher::new("dfinity/dre", token()).unwrap();
        assert_eq!(publisher.owner, "dfinity");
    }
}
