//! Forum announcements for release candidates.
//!
//! Every release gets one topic. Each (version, OS kind) pair owns a reply in
//! that topic, edited in place as the release moves from draft notes to an
//! open vote.

pub mod api;
pub mod cache;
pub mod dryrun;
pub mod error;
pub mod templates;
pub mod topic;

pub use api::{post_url, DiscourseApi, HttpDiscourse, NewTopic, Post, TopicPage, TopicSummary};
pub use cache::{CachedDiscourse, DEFAULT_TOPIC_TTL};
pub use dryrun::{DryRunDiscourse, MOCK_POSTS_FILE};
pub use error::{ForumError, Result};
pub use templates::{parse_reply, render_reply, ParsedReply, Reply, ReplyContent};
pub use topic::{topic_title, ForumClient, ReleaseTopic, DEFAULT_CATEGORY_ID};
