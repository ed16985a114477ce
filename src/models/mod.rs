pub mod article;
pub mod curation;
pub mod feed;
pub mod user;
pub mod workflow_run;

pub use article::{ArticleId, NewsArticle};
pub use curation::{NewsCuration, NewsCurationItem, RelevanceScore};
pub use feed::{FeedId, NewNewsFeed, NewsFeed, NewsFeedItem};
pub use user::User;
pub use workflow_run::{WorkflowRun, WorkflowRunStatus};
