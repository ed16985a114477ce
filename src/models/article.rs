use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for stored articles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleId(pub i64);

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A news article as collected from a source and, once read, hydrated with its content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsArticle {
    /// Database id, present once the article has been stored
    pub id: Option<ArticleId>,
    pub title: String,
    /// Publisher URL of the article
    pub url: String,
    /// Unix timestamp (seconds)
    pub published_at: i64,
    /// Name of the publisher
    pub source: String,
    /// Whether the article has been read and summarized
    pub is_hydrated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub thumbnail_url: Option<String>,
    pub summary: Option<String>,
    pub summary_short: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub author: Option<String>,
}

impl NewsArticle {
    /// Creates a collected (not yet hydrated) article
    pub fn new(title: impl Into<String>, url: impl Into<String>, published_at: i64, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            published_at,
            source: source.into(),
            ..Default::default()
        }
    }
}
