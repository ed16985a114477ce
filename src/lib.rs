pub mod agent;
pub mod base;
pub mod cli;
pub mod config;
pub mod data;
pub mod feed;
pub mod http;
pub mod llm;
pub mod models;
pub mod news;
pub mod services;
pub mod utils;

// Re-export repository traits
pub use base::{
    ArticleRepository,
    FeedItemRepository,
    FeedRepository,
    UserRepository,
    WorkflowRunRepository,
};

// Re-export models
pub use models::{
    article::{ArticleId, NewsArticle},
    curation::{NewsCuration, NewsCurationItem, RelevanceScore},
    feed::{FeedId, NewsFeed, NewsFeedItem},
    user::User,
    workflow_run::{WorkflowRun, WorkflowRunStatus},
};

pub use config::Config;
pub use data::Database;
