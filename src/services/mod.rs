pub mod feed_service;
pub mod news_digest;
pub mod populate_feed;
pub mod user_service;
pub mod workflow_runner;

pub use feed_service::{CreateFeedResult, FeedService, FEED_QUERY_OBJECTIVE};
pub use news_digest::{NewsDigestResult, NewsDigestService};
pub use populate_feed::{CurationSettings, PopulateFeedResult, PopulateFeedService};
pub use user_service::{AddUserResult, UserService};
pub use workflow_runner::run_workflow_with_history;
