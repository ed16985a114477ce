use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::article::ArticleId;

/// Unique identifier for news feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedId(pub i64);

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A per-user news feed, defined by the prompt describing what the user wants to follow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsFeed {
    /// Unique identifier for the feed
    pub id: FeedId,
    /// Owner of the feed
    pub user_id: String,
    /// Free-text description of the news the user is interested in
    pub query_prompt: String,
    /// When this feed was created
    pub created_at: DateTime<Utc>,
    /// When this feed was last updated
    pub updated_at: Option<DateTime<Utc>>,
}

/// A new feed that has not been persisted yet
#[derive(Debug, Clone)]
pub struct NewNewsFeed {
    pub user_id: String,
    pub query_prompt: String,
}

impl NewNewsFeed {
    pub fn new(user_id: impl Into<String>, query_prompt: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            query_prompt: query_prompt.into(),
        }
    }
}

/// Link between a feed and one of its curated articles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsFeedItem {
    pub id: i64,
    pub news_feed_id: FeedId,
    pub news_article_id: ArticleId,
    /// Scores assigned during curation, as JSON
    pub curation_scores: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
