//! Discourse API surface used by the reconciler, and its HTTP implementation.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::Result;
use crate::http::{check_status, create_http_client, HttpError};
use crate::retry::{retry_transient, RetryPolicy};

/// A post as returned by the forum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub topic_id: u64,
    pub topic_slug: String,
    /// Position in the topic; the opening post is number 1.
    pub post_number: u64,
    pub username: String,
    #[serde(default)]
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub id: u64,
    pub title: String,
    pub slug: String,
}

/// One page of a topic's post stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicPage {
    pub id: u64,
    pub title: String,
    pub slug: String,
    pub posts_count: u64,
    /// Zero-based page index.
    #[serde(default)]
    pub page: usize,
    pub post_stream: PostStream,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStream {
    #[serde(default)]
    pub posts: Vec<Post>,
}

/// Parameters for opening a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTopic {
    pub title: String,
    pub raw: String,
    pub category: u64,
    pub tags: Vec<String>,
}

/// The forum operations the reconciler relies on.
///
/// Page indices are zero-based regardless of the server's convention.
#[async_trait]
pub trait DiscourseApi: Send + Sync {
    /// Base URL of the forum, without trailing slash.
    fn host(&self) -> &str;

    /// The account posts are made as.
    fn username(&self) -> &str;

    async fn topics_created_by(&self, username: &str) -> Result<Vec<TopicSummary>>;

    async fn topic_page(&self, topic_id: u64, page: usize) -> Result<TopicPage>;

    /// Opens a topic and returns its first post.
    async fn create_topic(&self, topic: &NewTopic) -> Result<Post>;

    async fn create_post(&self, topic_id: u64, raw: &str) -> Result<Post>;

    async fn update_post(&self, post_id: u64, raw: &str) -> Result<Post>;
}

/// Stable link to a post.
pub fn post_url(host: &str, post: &Post) -> String {
    format!(
        "{}/t/{}/{}/{}",
        host.trim_end_matches('/'),
        post.topic_slug,
        post.topic_id,
        post.post_number
    )
}

#[derive(Deserialize)]
struct TopicList {
    topic_list: TopicListInner,
}

#[derive(Deserialize)]
struct TopicListInner {
    #[serde(default)]
    topics: Vec<TopicSummary>,
}

#[derive(Deserialize)]
struct UpdatedPost {
    post: Post,
}

/// Talks to a Discourse instance with an API key.
pub struct HttpDiscourse {
    host: String,
    username: String,
    api_key: SecretString,
    client: Client,
    retry: RetryPolicy,
}

impl HttpDiscourse {
    pub fn new(host: impl Into<String>, username: impl Into<String>, api_key: SecretString) -> Result<Self> {
        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            username: username.into(),
            api_key,
            client: create_http_client()?,
            retry: RetryPolicy::default(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", self.api_key.expose_secret())
            .header("Api-Username", &self.username)
            .header("Accept", "application/json")
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: &str,
        url: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<T> {
        log::info!("[DISCOURSE_API] {} {}", method, url);
        let build = &build;
        let value = retry_transient(self.retry, url, || async move {
            let response = self
                .authorized(build())
                .send()
                .await
                .map_err(|e| HttpError::from_reqwest(url, e))?;
            let response = check_status(url, response).await?;
            response
                .json::<T>()
                .await
                .map_err(|e| HttpError::from_reqwest(url, e))
        })
        .await?;
        Ok(value)
    }
}

#[async_trait]
impl DiscourseApi for HttpDiscourse {
    fn host(&self) -> &str {
        &self.host
    }

    fn username(&self) -> &str {
        &self.username
    }

    async fn topics_created_by(&self, username: &str) -> Result<Vec<TopicSummary>> {
        let url = format!("{}/topics/created-by/{}.json", self.host, username);
        let list: TopicList = self
            .send_json("GET", &url, || self.client.get(&url))
            .await?;
        Ok(list.topic_list.topics)
    }

    async fn topic_page(&self, topic_id: u64, page: usize) -> Result<TopicPage> {
        let url = format!("{}/t/{}.json", self.host, topic_id);
        let server_page = (page + 1).to_string();
        let mut topic: TopicPage = self
            .send_json("GET", &url, || {
                self.client
                    .get(&url)
                    .query(&[("page", server_page.as_str()), ("include_raw", "true")])
            })
            .await?;
        topic.page = page;
        Ok(topic)
    }

    async fn create_topic(&self, topic: &NewTopic) -> Result<Post> {
        let url = format!("{}/posts.json", self.host);
        self.send_json("POST", &url, || self.client.post(&url).json(topic))
            .await
    }

    async fn create_post(&self, topic_id: u64, raw: &str) -> Result<Post> {
        let url = format!("{}/posts.json", self.host);
        let body = json!({ "topic_id": topic_id, "raw": raw });
        self.send_json("POST", &url, || self.client.post(&url).json(&body))
            .await
    }

    async fn update_post(&self, post_id: u64, raw: &str) -> Result<Post> {
        let url = format!("{}/posts/{}.json", self.host, post_id);
        let body = json!({ "post": { "raw": raw } });
        let updated: UpdatedPost = self
            .send_json("PUT", &url, || self.client.put(&url).json(&body))
            .await?;
        Ok(Post {
            raw: raw.to_string(),
            ..updated.post
        })
    }
}
