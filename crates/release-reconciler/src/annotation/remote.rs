//! Client for a commit-annotation HTTP service.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::Client;

use super::determinator::{parse_packages, parse_verdict, CommitChangeDeterminator};
use super::error::{AnnotationError, Result};
use crate::http::{check_status, create_http_client, HttpError};
use crate::retry::{retry_transient, RetryPolicy};
use crate::types::{CommitInclusion, OsKind};

/// Reads annotations from `GET {base}/api/v1/commit/{sha}/annotation/{namespace}`.
pub struct RemoteDeterminator {
    base_url: String,
    client: Client,
    retry: RetryPolicy,
}

impl RemoteDeterminator {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(base_url, create_http_client()?))
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn annotation_url(&self, commit: &str, namespace: &str) -> String {
        format!(
            "{}/api/v1/commit/{}/annotation/{}",
            self.base_url, commit, namespace
        )
    }

    /// Fetches a note body, or `None` if the service has none.
    async fn fetch(&self, commit: &str, namespace: &str) -> Result<Option<String>> {
        let url = self.annotation_url(commit, namespace);
        let url = url.as_str();
        let client = &self.client;
        let result = retry_transient(self.retry, url, || async move {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| HttpError::from_reqwest(url, e))?;
            let response = check_status(url, response).await?;
            response
                .text()
                .await
                .map_err(|e| HttpError::from_reqwest(url, e))
        })
        .await;

        match result {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CommitChangeDeterminator for RemoteDeterminator {
    async fn classify(&self, commit: &str, os_kind: OsKind) -> Result<CommitInclusion> {
        let namespace = os_kind.changed_notes_namespace();
        match self.fetch(commit, namespace).await? {
            Some(body) => parse_verdict(commit, namespace, &body),
            None => Err(AnnotationError::NotReady {
                commit: commit.to_string(),
                os_kind,
            }),
        }
    }

    async fn dependency_packages(
        &self,
        commit: &str,
        os_kind: OsKind,
    ) -> Result<Option<BTreeSet<String>>> {
        Ok(self
            .fetch(commit, os_kind.targets_notes_namespace())
            .await?
            .map(|body| parse_packages(&body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_url_shape() {
        let det = RemoteDeterminator::with_client("http://annotator:9469/", Client::new());
        assert_eq!(
            det.annotation_url("abc", "hostos-changed"),
            "http://annotator:9469/api/v1/commit/abc/annotation/hostos-changed"
        );
    }
}
