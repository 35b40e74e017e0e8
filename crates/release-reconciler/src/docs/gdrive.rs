//! Google Drive backed change-log documents.

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::convert::{html_to_markdown, markdown_to_html};
use super::docx::{docx_to_markdown, is_docx};
use super::error::{DocumentError, Result};
use super::store::{title_matches, ChangelogDocuments, DocumentHandle};
use crate::http::{check_status, create_http_client, HttpError};
use crate::index::document_title;
use crate::retry::{retry_transient, RetryPolicy};
use crate::types::OsKind;

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";
const FILE_FIELDS: &str = "id,name,mimeType,webViewLink";

/// Word documents are what the editor keeps after the first save.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";

const MULTIPART_BOUNDARY: &str = "release-reconciler-upload";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    web_view_link: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

impl DriveFile {
    fn handle(&self, created: bool) -> DocumentHandle {
        DocumentHandle {
            id: self.id.clone(),
            title: self.name.clone(),
            url: self.web_view_link.clone(),
            created,
        }
    }
}

/// Documents in a Drive folder, addressed with a bearer token.
pub struct DriveDocuments {
    folder_id: String,
    token: SecretString,
    client: Client,
    retry: RetryPolicy,
}

impl DriveDocuments {
    pub fn new(folder_id: impl Into<String>, token: SecretString) -> Result<Self> {
        Ok(Self {
            folder_id: folder_id.into(),
            token,
            client: create_http_client()?,
            retry: RetryPolicy::default(),
        })
    }

    async fn find(&self, release_commit: &str, os_kind: OsKind) -> Result<Option<DriveFile>> {
        let url = format!("{}/files", DRIVE_API);
        let query = format!(
            "'{}' in parents and trashed = false and name contains '{}'",
            self.folder_id, release_commit
        );
        let fields = format!("files({})", FILE_FIELDS);
        let (query, fields) = (query.as_str(), fields.as_str());
        let url_ref = url.as_str();
        let client = &self.client;
        let token = &self.token;
        let list: FileList = retry_transient(self.retry, url_ref, || async move {
            let response = client
                .get(url_ref)
                .bearer_auth(token.expose_secret())
                .query(&[
                    ("q", query),
                    ("fields", fields),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ])
                .send()
                .await
                .map_err(|e| HttpError::from_reqwest(url_ref, e))?;
            check_status(url_ref, response)
                .await?
                .json::<FileList>()
                .await
                .map_err(|e| HttpError::from_reqwest(url_ref, e))
        })
        .await?;

        Ok(list
            .files
            .into_iter()
            .find(|f| title_matches(&f.name, release_commit, os_kind)))
    }

    async fn create(&self, title: &str, html: &str) -> Result<DriveFile> {
        let url = format!(
            "{}/files?uploadType=multipart&supportsAllDrives=true&fields={}",
            DRIVE_UPLOAD_API, FILE_FIELDS
        );
        let metadata = json!({
            "name": title,
            "mimeType": DOCX_MIME,
            "parents": [self.folder_id],
        });
        let body = format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: text/html; charset=UTF-8\r\n\r\n{html}\r\n--{b}--\r\n",
            b = MULTIPART_BOUNDARY,
            meta = metadata,
            html = html
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token.expose_secret())
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| HttpError::from_reqwest(&url, e))?;
        let file = check_status(&url, response)
            .await?
            .json::<DriveFile>()
            .await
            .map_err(|e| HttpError::from_reqwest(&url, e))?;
        Ok(file)
    }

    async fn download(&self, file: &DriveFile) -> Result<Vec<u8>> {
        let url = if file.mime_type == GOOGLE_DOC_MIME {
            format!("{}/files/{}/export?mimeType={}", DRIVE_API, file.id, DOCX_MIME)
        } else {
            format!("{}/files/{}?alt=media&supportsAllDrives=true", DRIVE_API, file.id)
        };
        let url_ref = url.as_str();
        let client = &self.client;
        let token = &self.token;
        let bytes = retry_transient(self.retry, url_ref, || async move {
            let response = client
                .get(url_ref)
                .bearer_auth(token.expose_secret())
                .send()
                .await
                .map_err(|e| HttpError::from_reqwest(url_ref, e))?;
            check_status(url_ref, response)
                .await?
                .bytes()
                .await
                .map_err(|e| HttpError::from_reqwest(url_ref, e))
        })
        .await?;
        Ok(bytes.to_vec())
    }
}

/// Markdown from downloaded document bytes: DOCX once saved by the editor,
/// HTML before that.
pub fn downloaded_to_markdown(bytes: &[u8]) -> Result<String> {
    if is_docx(bytes) {
        docx_to_markdown(bytes)
    } else {
        let html = std::str::from_utf8(bytes)
            .map_err(|e| DocumentError::Conversion(format!("Document is not UTF-8: {}", e)))?;
        html_to_markdown(html)
    }
}

#[async_trait]
impl ChangelogDocuments for DriveDocuments {
    async fn ensure(
        &self,
        release_tag: &str,
        release_commit: &str,
        os_kind: OsKind,
        content: &str,
    ) -> Result<DocumentHandle> {
        if let Some(existing) = self.find(release_commit, os_kind).await? {
            return Ok(existing.handle(false));
        }
        let title = document_title(os_kind, release_tag, release_commit);
        info!("Creating change-log document '{}'", title);
        let file = self.create(&title, &markdown_to_html(content)).await?;
        Ok(file.handle(true))
    }

    async fn fetch_markdown(&self, release_commit: &str, os_kind: OsKind) -> Result<Option<String>> {
        let Some(file) = self.find(release_commit, os_kind).await? else {
            return Ok(None);
        };
        let bytes = self.download(&file).await?;
        downloaded_to_markdown(&bytes).map(Some)
    }
}
