use anyhow::{Context, Result};
use log::{debug, info};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::path::Path;
use std::sync::Arc;

use crate::base::{
    ArticleRepository, FeedItemRepository, FeedRepository, UserRepository, WorkflowRunRepository,
};
use crate::data::migration::MigrationManager;
use crate::data::repositories::{
    SqliteArticleRepository, SqliteFeedItemRepository, SqliteFeedRepository,
    SqliteUserRepository, SqliteWorkflowRunRepository,
};
use crate::utils;

pub type DbPool = Arc<Pool<SqliteConnectionManager>>;

/// Owns the connection pool and hands out repositories backed by it
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Opens (creating if needed) the database file and brings the schema up to date
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(path) = db_path.to_str() {
            utils::ensure_directory_exists(path)?;
        }

        info!("Opening database at {}", db_path.display());
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::new(manager).context("Failed to create connection pool")?;

        let database = Self { pool: Arc::new(pool) };
        database.migrate()?;
        Ok(database)
    }

    /// Opens the database file without touching its schema
    pub fn open_unmigrated(db_path: &Path) -> Result<Self> {
        if let Some(path) = db_path.to_str() {
            utils::ensure_directory_exists(path)?;
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::new(manager).context("Failed to create connection pool")?;
        Ok(Self { pool: Arc::new(pool) })
    }

    /// A migrated in-memory database. Every connection to `:memory:` is a separate
    /// database, so the pool holds exactly one.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .context("Failed to create in-memory connection pool")?;

        let database = Self { pool: Arc::new(pool) };
        database.migrate()?;
        Ok(database)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.pool.get()?;
        let applied = MigrationManager::new(&conn).run_migrations()?;
        debug!("Applied {} migration(s)", applied.len());
        Ok(())
    }

    /// Shared handle to the connection pool
    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }

    pub fn user_repository(&self) -> Arc<dyn UserRepository> {
        Arc::new(SqliteUserRepository::new(self.pool.clone()))
    }

    pub fn feed_repository(&self) -> Arc<dyn FeedRepository> {
        Arc::new(SqliteFeedRepository::new(self.pool.clone()))
    }

    pub fn article_repository(&self) -> Arc<dyn ArticleRepository> {
        Arc::new(SqliteArticleRepository::new(self.pool.clone()))
    }

    pub fn feed_item_repository(&self) -> Arc<dyn FeedItemRepository> {
        Arc::new(SqliteFeedItemRepository::new(self.pool.clone()))
    }

    pub fn workflow_run_repository(&self) -> Arc<dyn WorkflowRunRepository> {
        Arc::new(SqliteWorkflowRunRepository::new(self.pool.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_file_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/duksu.db");

        let database = Database::open(&path).unwrap();

        assert!(path.exists());
        let conn = database.pool().get().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('users', 'news_feeds', 'news_articles')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("duksu.db");

        Database::open(&path).unwrap();
        let database = Database::open(&path).unwrap();

        let conn = database.pool().get().unwrap();
        let revisions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(revisions, 3);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let database = Database::in_memory().unwrap();
        let conn = database.pool().get().unwrap();
        let enabled: bool = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert!(enabled);
    }
}
