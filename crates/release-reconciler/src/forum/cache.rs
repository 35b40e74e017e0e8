//! Memoized topic-page reads.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;

use super::api::{DiscourseApi, NewTopic, Post, TopicPage, TopicSummary};
use super::error::Result;

/// Default lifetime of a cached topic page.
pub const DEFAULT_TOPIC_TTL: Duration = Duration::from_secs(3600);

const MAX_CACHED_PAGES: u64 = 1024;

/// Caches `topic_page` per `(topic_id, page)` for a fixed TTL.
///
/// Any write to a topic drops that topic's cached pages before returning, so
/// reads after a write always see it. A zero TTL disables caching.
pub struct CachedDiscourse {
    inner: Arc<dyn DiscourseApi>,
    pages: Option<Cache<(u64, usize), TopicPage>>,
}

impl CachedDiscourse {
    pub fn new(inner: Arc<dyn DiscourseApi>, ttl: Duration) -> Self {
        let pages = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(MAX_CACHED_PAGES)
                .time_to_live(ttl)
                .build()
        });
        Self { inner, pages }
    }

    pub fn invalidate_topic(&self, topic_id: u64) {
        let Some(pages) = &self.pages else {
            return;
        };
        let stale: Vec<(u64, usize)> = pages
            .iter()
            .filter(|(key, _)| key.0 == topic_id)
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            pages.invalidate(&key);
        }
    }
}

#[async_trait]
impl DiscourseApi for CachedDiscourse {
    fn host(&self) -> &str {
        self.inner.host()
    }

    fn username(&self) -> &str {
        self.inner.username()
    }

    async fn topics_created_by(&self, username: &str) -> Result<Vec<TopicSummary>> {
        self.inner.topics_created_by(username).await
    }

    async fn topic_page(&self, topic_id: u64, page: usize) -> Result<TopicPage> {
        let Some(pages) = &self.pages else {
            return self.inner.topic_page(topic_id, page).await;
        };
        if let Some(hit) = pages.get(&(topic_id, page)) {
            log::debug!("Topic {} page {} served from cache", topic_id, page);
            return Ok(hit);
        }
        let fresh = self.inner.topic_page(topic_id, page).await?;
        pages.insert((topic_id, page), fresh.clone());
        Ok(fresh)
    }

    async fn create_topic(&self, topic: &NewTopic) -> Result<Post> {
        let post = self.inner.create_topic(topic).await?;
        self.invalidate_topic(post.topic_id);
        Ok(post)
    }

    async fn create_post(&self, topic_id: u64, raw: &str) -> Result<Post> {
        let result = self.inner.create_post(topic_id, raw).await;
        self.invalidate_topic(topic_id);
        result
    }

    async fn update_post(&self, post_id: u64, raw: &str) -> Result<Post> {
        let post = self.inner.update_post(post_id, raw).await?;
        self.invalidate_topic(post.topic_id);
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::forum::api::PostStream;

    struct CountingForum {
        reads: AtomicUsize,
    }

    fn post(id: u64, raw: &str) -> Post {
        Post {
            id,
            topic_id: 1,
            topic_slug: "t".to_string(),
            post_number: id,
            username: "bot".to_string(),
            raw: raw.to_string(),
        }
    }

    #[async_trait]
    impl DiscourseApi for CountingForum {
        fn host(&self) -> &str {
            "https://forum.example.org"
        }

        fn username(&self) -> &str {
            "bot"
        }

        async fn topics_created_by(&self, _username: &str) -> Result<Vec<TopicSummary>> {
            Ok(Vec::new())
        }

        async fn topic_page(&self, topic_id: u64, page: usize) -> Result<TopicPage> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(TopicPage {
                id: topic_id,
                title: "t".to_string(),
                slug: "t".to_string(),
                posts_count: 1,
                page,
                post_stream: PostStream {
                    posts: vec![post(1, &format!("read {}", n))],
                },
            })
        }

        async fn create_topic(&self, _topic: &NewTopic) -> Result<Post> {
            Ok(post(1, ""))
        }

        async fn create_post(&self, _topic_id: u64, raw: &str) -> Result<Post> {
            Ok(post(2, raw))
        }

        async fn update_post(&self, post_id: u64, raw: &str) -> Result<Post> {
            Ok(post(post_id, raw))
        }
    }

    fn counting() -> Arc<CountingForum> {
        Arc::new(CountingForum {
            reads: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_reads_within_ttl_hit_cache() {
        let inner = counting();
        let cached = CachedDiscourse::new(inner.clone(), DEFAULT_TOPIC_TTL);
        let first = cached.topic_page(1, 0).await.unwrap();
        let second = cached.topic_page(1, 0).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.reads.load(Ordering::SeqCst), 1);

        cached.topic_page(1, 1).await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_write_invalidates_topic() {
        let inner = counting();
        let cached = CachedDiscourse::new(inner.clone(), DEFAULT_TOPIC_TTL);
        cached.topic_page(1, 0).await.unwrap();
        cached.update_post(1, "edited").await.unwrap();
        let after = cached.topic_page(1, 0).await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), 2);
        assert_eq!(after.post_stream.posts[0].raw, "read 1");
    }

    #[tokio::test]
    async fn test_other_topics_stay_cached() {
        let inner = counting();
        let cached = CachedDiscourse::new(inner.clone(), DEFAULT_TOPIC_TTL);
        cached.topic_page(2, 0).await.unwrap();
        cached.create_post(1, "new").await.unwrap();
        cached.topic_page(2, 0).await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let inner = counting();
        let cached = CachedDiscourse::new(inner.clone(), Duration::ZERO);
        cached.topic_page(1, 0).await.unwrap();
        cached.topic_page(1, 0).await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), 2);
    }
}
