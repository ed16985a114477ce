use anyhow::Result;

use crate::models::{
    ArticleId, FeedId, NewNewsFeed, NewsArticle, NewsFeed, NewsFeedItem, User, WorkflowRun,
    WorkflowRunStatus,
};

// ==================== UserRepository ====================
pub trait UserRepository: Send + Sync {
    /// Inserts a user and returns the stored record
    fn create_user(&self, user_id: &str) -> Result<User>;

    /// Retrieves a user by its external id
    fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Lists every user
    fn get_all_users(&self) -> Result<Vec<User>>;
}

// ==================== FeedRepository ====================
pub trait FeedRepository: Send + Sync {
    /// Creates a feed and returns it with its generated id
    fn create_feed(&self, feed: &NewNewsFeed) -> Result<NewsFeed>;

    /// Retrieves a feed by id
    fn get_feed_by_id(&self, id: FeedId) -> Result<Option<NewsFeed>>;

    /// Finds the feed a user already has for exactly this query prompt
    fn find_feed(&self, user_id: &str, query_prompt: &str) -> Result<Option<NewsFeed>>;

    /// Lists a user's feeds
    fn get_feeds_by_user(&self, user_id: &str) -> Result<Vec<NewsFeed>>;

    /// Deletes a feed together with its feed items
    fn delete_feed(&self, id: FeedId) -> Result<()>;
}

// ==================== ArticleRepository ====================
pub trait ArticleRepository: Send + Sync {
    /// Inserts an article; `raw_html_path` and `content_markdown_path` point into the object store
    fn create_article(
        &self,
        article: &NewsArticle,
        raw_html_path: Option<&str>,
        content_markdown_path: Option<&str>,
    ) -> Result<ArticleId>;

    /// Retrieves an article by id
    fn get_article(&self, id: ArticleId) -> Result<Option<NewsArticle>>;

    /// Retrieves an article by its URL
    fn get_article_by_url(&self, url: &str) -> Result<Option<NewsArticle>>;

    /// Returns the stored articles among `urls`, in no particular order
    fn get_articles_by_urls(&self, urls: &[String]) -> Result<Vec<NewsArticle>>;
}

// ==================== FeedItemRepository ====================
pub trait FeedItemRepository: Send + Sync {
    /// Links an article to a feed; linking the same pair twice is a no-op
    fn add_feed_item(
        &self,
        feed_id: FeedId,
        article_id: ArticleId,
        curation_scores: Option<&serde_json::Value>,
    ) -> Result<bool>;

    /// Links several articles in one transaction: either every link is written or none.
    /// Returns how many links were new.
    fn add_feed_items(&self, feed_id: FeedId, items: &[(ArticleId, Option<serde_json::Value>)]) -> Result<usize>;

    /// Whether the article is already linked to the feed
    fn feed_item_exists(&self, feed_id: FeedId, article_id: ArticleId) -> Result<bool>;

    /// Feed items in insertion order
    fn get_feed_items(&self, feed_id: FeedId) -> Result<Vec<NewsFeedItem>>;

    /// Articles of a feed, newest first
    fn get_feed_articles(&self, feed_id: FeedId) -> Result<Vec<NewsArticle>>;
}

// ==================== WorkflowRunRepository ====================
pub trait WorkflowRunRepository: Send + Sync {
    /// Records a `started` run and returns its id
    fn start_run(&self, workflow_name: &str, input_data: &str) -> Result<i64>;

    /// Sets the final status, output and completion time of a run
    fn finish_run(&self, id: i64, status: WorkflowRunStatus, output_data: &str) -> Result<()>;

    /// Retrieves a run by id
    fn get_run(&self, id: i64) -> Result<Option<WorkflowRun>>;

    /// Most recent runs first
    fn get_recent_runs(&self, limit: usize) -> Result<Vec<WorkflowRun>>;
}
