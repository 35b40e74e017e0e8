//! Release topics and their ordered reply slots.

use std::sync::Arc;

use log::info;

use super::api::{post_url, DiscourseApi, NewTopic, Post};
use super::error::Result;
use super::templates::{Reply, PLACEHOLDER_BODY};
use crate::index::Release;

pub const DEFAULT_CATEGORY_ID: u64 = 76;
pub const TOPIC_TAGS: &[&str] = &["replica", "release"];

pub fn topic_title(rc_name: &str) -> String {
    format!("Proposal to elect new release {}", rc_name)
}

/// Finds or opens the topic for a release.
pub struct ForumClient {
    api: Arc<dyn DiscourseApi>,
    category_id: u64,
}

impl ForumClient {
    pub fn new(api: Arc<dyn DiscourseApi>, category_id: u64) -> Self {
        Self { api, category_id }
    }

    pub fn api(&self) -> &Arc<dyn DiscourseApi> {
        &self.api
    }

    /// Returns the topic owned by our account whose title names the release,
    /// creating it with a placeholder body if there is none.
    pub async fn get_or_create(&self, release: &Release) -> Result<ReleaseTopic> {
        let username = self.api.username().to_string();
        let existing = self
            .api
            .topics_created_by(&username)
            .await?
            .into_iter()
            .find(|t| t.title.contains(&release.rc_name));

        let topic_id = match existing {
            Some(topic) => topic.id,
            None => {
                info!("Creating forum topic for {}", release.rc_name);
                let first = self
                    .api
                    .create_topic(&NewTopic {
                        title: topic_title(&release.rc_name),
                        raw: PLACEHOLDER_BODY.to_string(),
                        category: self.category_id,
                        tags: TOPIC_TAGS.iter().map(|t| t.to_string()).collect(),
                    })
                    .await?;
                first.topic_id
            }
        };

        Ok(ReleaseTopic {
            api: Arc::clone(&self.api),
            topic_id,
            rc_name: release.rc_name.clone(),
        })
    }
}

/// A release topic. Replies by our account after the opening post are slots,
/// one per (version, OS kind) pair in declared order.
pub struct ReleaseTopic {
    api: Arc<dyn DiscourseApi>,
    topic_id: u64,
    rc_name: String,
}

impl ReleaseTopic {
    pub fn topic_id(&self) -> u64 {
        self.topic_id
    }

    pub fn rc_name(&self) -> &str {
        &self.rc_name
    }

    /// Our replies, oldest first, across all pages.
    pub async fn owned_replies(&self) -> Result<Vec<Post>> {
        let username = self.api.username().to_string();
        let mut replies = Vec::new();
        let mut seen: u64 = 0;
        let mut page = 0;
        loop {
            let topic = self.api.topic_page(self.topic_id, page).await?;
            if topic.post_stream.posts.is_empty() {
                break;
            }
            seen += topic.post_stream.posts.len() as u64;
            replies.extend(
                topic
                    .post_stream
                    .posts
                    .into_iter()
                    .filter(|p| p.post_number > 1 && p.username == username),
            );
            if seen >= topic.posts_count {
                break;
            }
            page += 1;
        }
        replies.sort_by_key(|p| p.post_number);
        Ok(replies)
    }

    /// Brings the slots in line with `replies`, in order.
    ///
    /// Existing slots are edited only when their body changed. A new slot is
    /// appended only when every earlier pair already has one, so the physical
    /// reply order always matches the declared order. Returns the slots.
    pub async fn update(&self, replies: &[Reply]) -> Result<Vec<Post>> {
        let mut slots = self.owned_replies().await?;
        for (idx, reply) in replies.iter().enumerate() {
            let body = reply.body();
            match (slots.get(idx).cloned(), body) {
                (Some(slot), Some(body)) => {
                    if slot.raw.trim() != body.trim() {
                        info!(
                            "Updating forum post for {} {} in {}",
                            reply.version, reply.os_kind, self.rc_name
                        );
                        slots[idx] = self.api.update_post(slot.id, &body).await?;
                    }
                }
                (Some(_), None) => {}
                (None, Some(body)) => {
                    info!(
                        "Posting forum reply for {} {} in {}",
                        reply.version, reply.os_kind, self.rc_name
                    );
                    let post = self.api.create_post(self.topic_id, &body).await?;
                    slots.push(post);
                }
                (None, None) => break,
            }
        }
        Ok(slots)
    }

    /// Link to the slot of the pair at `position` in declared order.
    pub async fn post_url(&self, position: usize) -> Result<Option<String>> {
        let slots = self.owned_replies().await?;
        Ok(slots.get(position).map(|post| post_url(self.api.host(), post)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forum::dryrun::DryRunDiscourse;
    use crate::forum::templates::ReplyContent;
    use crate::index::Version;
    use crate::types::OsKind;

    fn release() -> Release {
        Release {
            rc_name: "rc--2024-02-21_23-06".to_string(),
            versions: vec![
                Version {
                    name: "base".to_string(),
                    version: "1".repeat(40),
                    security_fix: false,
                },
                Version {
                    name: "feat".to_string(),
                    version: "2".repeat(40),
                    security_fix: false,
                },
            ],
        }
    }

    fn reply(version: &Version, content: Option<ReplyContent>) -> Reply {
        Reply {
            version: version.version.clone(),
            os_kind: OsKind::GuestOs,
            tag: format!("release-2024-02-21_23-06-{}", version.name),
            content,
        }
    }

    fn draft(text: &str) -> Option<ReplyContent> {
        Some(ReplyContent::Draft {
            changelog: text.to_string(),
        })
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let api = Arc::new(DryRunDiscourse::in_memory());
        let client = ForumClient::new(api.clone(), DEFAULT_CATEGORY_ID);
        let first = client.get_or_create(&release()).await.unwrap();
        let second = client.get_or_create(&release()).await.unwrap();
        assert_eq!(first.topic_id(), second.topic_id());
        let topics = api.topics();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].title, "Proposal to elect new release rc--2024-02-21_23-06");
        assert_eq!(topics[0].category, 76);
        assert_eq!(topics[0].posts[0].raw, PLACEHOLDER_BODY);
    }

    #[tokio::test]
    async fn test_slots_follow_declared_order() {
        let api = Arc::new(DryRunDiscourse::in_memory());
        let rel = release();
        let topic = ForumClient::new(api.clone(), DEFAULT_CATEGORY_ID)
            .get_or_create(&rel)
            .await
            .unwrap();

        // second version ready before the first: nothing may be posted yet
        let slots = topic
            .update(&[reply(&rel.versions[0], None), reply(&rel.versions[1], draft("b"))])
            .await
            .unwrap();
        assert!(slots.is_empty());

        let slots = topic
            .update(&[reply(&rel.versions[0], draft("a")), reply(&rel.versions[1], draft("b"))])
            .await
            .unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots[0].raw.contains(&rel.versions[0].version));
        assert!(slots[1].raw.contains(&rel.versions[1].version));
        assert!(slots[0].post_number < slots[1].post_number);
    }

    #[tokio::test]
    async fn test_unchanged_slots_are_not_edited() {
        let api = Arc::new(DryRunDiscourse::in_memory());
        let rel = release();
        let topic = ForumClient::new(api.clone(), DEFAULT_CATEGORY_ID)
            .get_or_create(&rel)
            .await
            .unwrap();
        let replies = [reply(&rel.versions[0], draft("a"))];
        topic.update(&replies).await.unwrap();
        topic.update(&replies).await.unwrap();
        assert_eq!(api.topics()[0].posts.len(), 2);

        let voting = [reply(
            &rel.versions[0],
            Some(ReplyContent::Voting {
                proposal_id: 1,
                summary: "s".to_string(),
            }),
        )];
        let slots = topic.update(&voting).await.unwrap();
        assert!(slots[0].raw.contains("IC NNS Proposal 1"));
        assert_eq!(api.topics()[0].posts.len(), 2);

        let url = topic.post_url(0).await.unwrap().unwrap();
        assert_eq!(
            url,
            format!("https://forum.example.org/t/{}/{}/2", slots[0].topic_slug, slots[0].topic_id)
        );
        assert_eq!(topic.post_url(1).await.unwrap(), None);
    }
}
