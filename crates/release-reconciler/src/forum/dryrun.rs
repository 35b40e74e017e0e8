//! A forum that only exists on local disk.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::api::{DiscourseApi, NewTopic, Post, PostStream, TopicPage, TopicSummary};
use super::error::{ForumError, Result};

pub const MOCK_POSTS_FILE: &str = "mock-posts.json";

const DRY_RUN_HOST: &str = "https://forum.example.org";
const DRY_RUN_USER: &str = "release-reconciler";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTopic {
    pub id: u64,
    pub title: String,
    pub slug: String,
    pub category: u64,
    pub tags: Vec<String>,
    pub posts: Vec<Post>,
}

/// Simulated forum. Topics and posts persist to `mock-posts.json` when a
/// storage folder is given.
pub struct DryRunDiscourse {
    storage: Option<PathBuf>,
    topics: Mutex<Vec<StoredTopic>>,
}

impl DryRunDiscourse {
    pub fn in_memory() -> Self {
        Self {
            storage: None,
            topics: Mutex::new(Vec::new()),
        }
    }

    /// Loads earlier simulated posts from `folder`, if any.
    pub fn open(folder: impl Into<PathBuf>) -> Result<Self> {
        let folder = folder.into();
        let file = folder.join(MOCK_POSTS_FILE);
        let topics = if file.exists() {
            let data = std::fs::read(&file).map_err(|e| ForumError::storage(&file, e))?;
            serde_json::from_slice(&data).map_err(|e| ForumError::storage(&file, e))?
        } else {
            Vec::new()
        };
        Ok(Self {
            storage: Some(folder),
            topics: Mutex::new(topics),
        })
    }

    /// Snapshot of every simulated topic.
    pub fn topics(&self) -> Vec<StoredTopic> {
        self.topics
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    fn with_topics<T>(&self, f: impl FnOnce(&mut Vec<StoredTopic>) -> Result<T>) -> Result<T> {
        let mut topics = self
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let value = f(&mut topics)?;
        if let Some(folder) = &self.storage {
            persist(folder, &topics)?;
        }
        Ok(value)
    }
}

fn persist(folder: &Path, topics: &[StoredTopic]) -> Result<()> {
    let file = folder.join(MOCK_POSTS_FILE);
    std::fs::create_dir_all(folder).map_err(|e| ForumError::storage(folder, e))?;
    let data = serde_json::to_vec_pretty(topics).map_err(|e| ForumError::storage(&file, e))?;
    std::fs::write(&file, data).map_err(|e| ForumError::storage(&file, e))
}

fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn append_post(topic: &mut StoredTopic, raw: &str) -> Post {
    let post = Post {
        id: 1000 + topic.id * 1000 + topic.posts.len() as u64,
        topic_id: topic.id,
        topic_slug: topic.slug.clone(),
        post_number: topic.posts.len() as u64 + 1,
        username: DRY_RUN_USER.to_string(),
        raw: raw.to_string(),
    };
    topic.posts.push(post.clone());
    post
}

#[async_trait]
impl DiscourseApi for DryRunDiscourse {
    fn host(&self) -> &str {
        DRY_RUN_HOST
    }

    fn username(&self) -> &str {
        DRY_RUN_USER
    }

    async fn topics_created_by(&self, _username: &str) -> Result<Vec<TopicSummary>> {
        Ok(self
            .topics()
            .into_iter()
            .map(|t| TopicSummary {
                id: t.id,
                title: t.title,
                slug: t.slug,
            })
            .collect())
    }

    /// Every post lives on page 0.
    async fn topic_page(&self, topic_id: u64, page: usize) -> Result<TopicPage> {
        let topic = self
            .topics()
            .into_iter()
            .find(|t| t.id == topic_id)
            .ok_or(ForumError::TopicNotFound(topic_id))?;
        Ok(TopicPage {
            id: topic.id,
            title: topic.title,
            slug: topic.slug,
            posts_count: topic.posts.len() as u64,
            page,
            post_stream: PostStream {
                posts: if page == 0 { topic.posts } else { Vec::new() },
            },
        })
    }

    async fn create_topic(&self, new_topic: &NewTopic) -> Result<Post> {
        log::warn!("Simulated creation of topic '{}'", new_topic.title);
        self.with_topics(|topics| {
            let mut topic = StoredTopic {
                id: topics.len() as u64,
                title: new_topic.title.clone(),
                slug: slugify(&new_topic.title),
                category: new_topic.category,
                tags: new_topic.tags.clone(),
                posts: Vec::new(),
            };
            let post = append_post(&mut topic, &new_topic.raw);
            topics.push(topic);
            Ok(post)
        })
    }

    async fn create_post(&self, topic_id: u64, raw: &str) -> Result<Post> {
        self.with_topics(|topics| {
            let topic = topics
                .iter_mut()
                .find(|t| t.id == topic_id)
                .ok_or(ForumError::TopicNotFound(topic_id))?;
            let post = append_post(topic, raw);
            log::warn!("Simulated post {} in topic {}", post.id, topic_id);
            Ok(post)
        })
    }

    async fn update_post(&self, post_id: u64, raw: &str) -> Result<Post> {
        self.with_topics(|topics| {
            let post = topics
                .iter_mut()
                .flat_map(|t| t.posts.iter_mut())
                .find(|p| p.id == post_id)
                .ok_or(ForumError::PostNotFound(post_id))?;
            post.raw = raw.to_string();
            log::warn!("Simulated update of post {}", post_id);
            Ok(post.clone())
        })
    }
}
