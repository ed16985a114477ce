pub mod article_store;
pub mod database;
pub mod migration;
pub mod object_store;
pub mod repositories;

pub use article_store::ArticleStore;
pub use database::Database;
pub use migration::{DowngradeTarget, MigrationManager};
pub use object_store::{ContentMetadata, LocalFileSystemBackend, ObjectStore, ObjectStoreBackend};
pub use repositories::*;
