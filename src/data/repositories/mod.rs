mod article_repository;
mod feed_item_repository;
mod feed_repository;
mod user_repository;
mod workflow_run_repository;

pub use article_repository::SqliteArticleRepository;
pub use feed_item_repository::SqliteFeedItemRepository;
pub use feed_repository::SqliteFeedRepository;
pub use user_repository::SqliteUserRepository;
pub use workflow_run_repository::SqliteWorkflowRunRepository;
