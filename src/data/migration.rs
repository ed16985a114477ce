use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension};

/// A single schema revision with its upgrade and downgrade scripts
#[derive(Debug)]
pub struct Migration {
    pub revision: &'static str,
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

/// Ordered schema history, oldest first
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        revision: "a36061e28468",
        name: "create_workflow_run_history_table",
        up: "
            CREATE TABLE workflow_run_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                workflow_name TEXT NOT NULL,
                input_data TEXT NOT NULL,
                output_data TEXT,
                status TEXT NOT NULL CHECK (status IN ('started', 'completed', 'failed', 'error')),
                started_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE INDEX ix_workflow_run_history_workflow_name ON workflow_run_history (workflow_name);
        ",
        down: "
            DROP INDEX IF EXISTS ix_workflow_run_history_workflow_name;
            DROP TABLE IF EXISTS workflow_run_history;
        ",
    },
    Migration {
        revision: "19ca9d0b2b16",
        name: "create_news_feeds_and_articles_tables",
        up: "
            CREATE TABLE news_articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                published_at INTEGER NOT NULL,
                source TEXT NOT NULL,
                raw_html_path TEXT,
                content_markdown_path TEXT,
                thumbnail_url TEXT,
                summary TEXT,
                summary_short TEXT,
                keywords TEXT,
                author TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );
            CREATE UNIQUE INDEX ix_news_articles_url ON news_articles (url);
            CREATE INDEX ix_news_articles_source ON news_articles (source);

            CREATE TABLE news_feeds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                query_prompt TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );
            CREATE INDEX ix_news_feeds_user_id ON news_feeds (user_id);

            CREATE TABLE news_feed_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                news_feed_id INTEGER NOT NULL REFERENCES news_feeds (id) ON DELETE CASCADE,
                news_article_id INTEGER NOT NULL REFERENCES news_articles (id),
                curation_scores TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT,
                UNIQUE (news_feed_id, news_article_id)
            );
            CREATE INDEX ix_news_feed_items_news_feed_id ON news_feed_items (news_feed_id);
            CREATE INDEX ix_news_feed_items_news_article_id ON news_feed_items (news_article_id);
        ",
        down: "
            DROP TABLE IF EXISTS news_feed_items;
            DROP TABLE IF EXISTS news_feeds;
            DROP TABLE IF EXISTS news_articles;
        ",
    },
    Migration {
        revision: "acf7562b405f",
        name: "create_users_table",
        // SQLite cannot add a foreign key to an existing table, so news_feeds is rebuilt.
        // Owners of pre-existing feeds are backfilled into users first.
        up: "
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );
            CREATE UNIQUE INDEX ix_users_user_id ON users (user_id);

            INSERT OR IGNORE INTO users (user_id, created_at)
                SELECT DISTINCT user_id, strftime('%Y-%m-%dT%H:%M:%SZ', 'now') FROM news_feeds;

            CREATE TABLE news_feeds_new (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users (user_id),
                query_prompt TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );
            INSERT INTO news_feeds_new (id, user_id, query_prompt, created_at, updated_at)
                SELECT id, user_id, query_prompt, created_at, updated_at FROM news_feeds;
            DROP TABLE news_feeds;
            ALTER TABLE news_feeds_new RENAME TO news_feeds;
            CREATE INDEX ix_news_feeds_user_id ON news_feeds (user_id);
        ",
        down: "
            CREATE TABLE news_feeds_old (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                query_prompt TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );
            INSERT INTO news_feeds_old (id, user_id, query_prompt, created_at, updated_at)
                SELECT id, user_id, query_prompt, created_at, updated_at FROM news_feeds;
            DROP TABLE news_feeds;
            ALTER TABLE news_feeds_old RENAME TO news_feeds;
            CREATE INDEX ix_news_feeds_user_id ON news_feeds (user_id);

            DROP INDEX IF EXISTS ix_users_user_id;
            DROP TABLE IF EXISTS users;
        ",
    },
];

/// Target of a downgrade: a number of revisions, a specific revision, or an empty schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DowngradeTarget {
    Steps(usize),
    Revision(String),
    Base,
}

impl DowngradeTarget {
    /// Parses `-N`, `base`, or a revision id
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "base" {
            return Ok(Self::Base);
        }
        if let Some(steps) = s.strip_prefix('-') {
            let steps: usize = steps
                .parse()
                .with_context(|| format!("Invalid relative downgrade target: {}", s))?;
            if steps == 0 {
                bail!("Relative downgrade target must be at least -1");
            }
            return Ok(Self::Steps(steps));
        }
        Ok(Self::Revision(s.to_string()))
    }
}

/// Database migration manager that tracks applied revisions in `schema_migrations`
pub struct MigrationManager<'a> {
    connection: &'a Connection,
    migrations: &'a [Migration],
}

impl<'a> MigrationManager<'a> {
    /// Creates a new migration manager over the built-in revisions
    pub fn new(connection: &'a Connection) -> Self {
        Self::with_migrations(connection, MIGRATIONS)
    }

    pub fn with_migrations(connection: &'a Connection, migrations: &'a [Migration]) -> Self {
        Self { connection, migrations }
    }

    /// Applies every pending revision
    pub fn run_migrations(&self) -> Result<Vec<&'static str>> {
        self.upgrade("head")
    }

    /// Applies pending revisions up to and including `target` (`head` for all)
    pub fn upgrade(&self, target: &str) -> Result<Vec<&'static str>> {
        self.create_migrations_table()?;

        let last_index = if target == "head" {
            self.migrations.len().checked_sub(1)
        } else {
            Some(self.index_of(target)?)
        };

        let Some(last_index) = last_index else {
            return Ok(Vec::new());
        };

        let mut applied = Vec::new();
        for migration in &self.migrations[..=last_index] {
            if self.is_migration_applied(migration.revision)? {
                debug!("Migration '{}' already applied, skipping", migration.revision);
                continue;
            }
            info!("Running upgrade -> {} ({})", migration.revision, migration.name);
            self.apply(migration.up, || self.record_migration(migration))
                .with_context(|| format!("Failed to apply migration {}", migration.revision))?;
            applied.push(migration.revision);
        }

        if applied.is_empty() {
            info!("Database schema is up to date");
        }
        Ok(applied)
    }

    /// Reverts applied revisions, newest first
    pub fn downgrade(&self, target: &DowngradeTarget) -> Result<Vec<&'static str>> {
        self.create_migrations_table()?;

        let applied = self.applied_indices()?;
        let to_revert: Vec<usize> = match target {
            DowngradeTarget::Base => applied.iter().rev().copied().collect(),
            DowngradeTarget::Steps(steps) => {
                if *steps > applied.len() {
                    bail!(
                        "Cannot downgrade {} revision(s); only {} applied",
                        steps,
                        applied.len()
                    );
                }
                applied.iter().rev().take(*steps).copied().collect()
            }
            DowngradeTarget::Revision(revision) => {
                let keep = self.index_of(revision)?;
                applied.iter().rev().filter(|i| **i > keep).copied().collect()
            }
        };

        let mut reverted = Vec::new();
        for index in to_revert {
            let migration = &self.migrations[index];
            info!("Running downgrade {} ({})", migration.revision, migration.name);
            self.apply(migration.down, || self.remove_migration(migration.revision))
                .with_context(|| format!("Failed to revert migration {}", migration.revision))?;
            reverted.push(migration.revision);
        }
        Ok(reverted)
    }

    /// Latest applied revision, if any
    pub fn current(&self) -> Result<Option<&'static str>> {
        self.create_migrations_table()?;
        Ok(self
            .applied_indices()?
            .last()
            .map(|i| self.migrations[*i].revision))
    }

    /// All known revisions with whether each is applied
    pub fn history(&self) -> Result<Vec<(&'a Migration, bool)>> {
        self.create_migrations_table()?;
        self.migrations
            .iter()
            .map(|m| Ok((m, self.is_migration_applied(m.revision)?)))
            .collect()
    }

    /// Runs a script and its bookkeeping in one transaction with foreign keys suspended,
    /// so tables can be rebuilt while other tables reference them.
    fn apply<F>(&self, script: &str, bookkeeping: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let foreign_keys: bool = self
            .connection
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        self.connection.execute_batch("PRAGMA foreign_keys = OFF;")?;

        let result = (|| -> Result<()> {
            let tx = self.connection.unchecked_transaction()?;
            tx.execute_batch(script)?;
            bookkeeping()?;
            self.check_foreign_keys()?;
            tx.commit()?;
            Ok(())
        })();

        if foreign_keys {
            self.connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        }
        result
    }

    fn check_foreign_keys(&self) -> Result<()> {
        let violation: Option<String> = self
            .connection
            .query_row("PRAGMA foreign_key_check", [], |row| row.get(0))
            .optional()?;
        match violation {
            Some(table) => Err(anyhow!("Foreign key violation in table '{}'", table)),
            None => Ok(()),
        }
    }

    fn index_of(&self, revision: &str) -> Result<usize> {
        self.migrations
            .iter()
            .position(|m| m.revision == revision)
            .ok_or_else(|| anyhow!("Unknown revision: {}", revision))
    }

    fn applied_indices(&self) -> Result<Vec<usize>> {
        let mut indices = Vec::new();
        for (i, migration) in self.migrations.iter().enumerate() {
            if self.is_migration_applied(migration.revision)? {
                indices.push(i);
            }
        }
        Ok(indices)
    }

    /// Creates the table that tracks which revisions have been applied
    fn create_migrations_table(&self) -> Result<()> {
        self.connection
            .execute(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    id INTEGER PRIMARY KEY,
                    revision TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    applied_at TEXT NOT NULL
                )",
                [],
            )
            .context("Failed to create schema_migrations table")?;
        Ok(())
    }

    fn is_migration_applied(&self, revision: &str) -> Result<bool> {
        let count: i64 = self
            .connection
            .query_row(
                "SELECT COUNT(*) FROM schema_migrations WHERE revision = ?",
                [revision],
                |row| row.get(0),
            )
            .context("Failed to check if migration has been applied")?;
        Ok(count > 0)
    }

    fn record_migration(&self, migration: &Migration) -> Result<()> {
        debug!("Recording migration '{}' as applied", migration.revision);
        self.connection
            .execute(
                "INSERT INTO schema_migrations (revision, name, applied_at) VALUES (?, ?, datetime('now'))",
                [migration.revision, migration.name],
            )
            .context("Failed to record migration")?;
        Ok(())
    }

    fn remove_migration(&self, revision: &str) -> Result<()> {
        self.connection
            .execute("DELETE FROM schema_migrations WHERE revision = ?", [revision])
            .context("Failed to remove migration record")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?",
            [name],
            |_| Ok(true),
        )
        .is_ok()
    }

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn test_upgrade_head_creates_schema() -> Result<()> {
        let conn = open();
        let manager = MigrationManager::new(&conn);

        let applied = manager.upgrade("head")?;

        assert_eq!(applied, vec!["a36061e28468", "19ca9d0b2b16", "acf7562b405f"]);
        for table in ["workflow_run_history", "news_articles", "news_feeds", "news_feed_items", "users"] {
            assert!(table_exists(&conn, table), "{} should exist", table);
        }
        assert_eq!(manager.current()?, Some("acf7562b405f"));
        Ok(())
    }

    #[test]
    fn test_upgrade_is_idempotent() -> Result<()> {
        let conn = open();
        let manager = MigrationManager::new(&conn);

        manager.run_migrations()?;
        let second = manager.run_migrations()?;

        assert!(second.is_empty());
        Ok(())
    }

    #[test]
    fn test_upgrade_to_specific_revision() -> Result<()> {
        let conn = open();
        let manager = MigrationManager::new(&conn);

        manager.upgrade("19ca9d0b2b16")?;

        assert!(table_exists(&conn, "news_feeds"));
        assert!(!table_exists(&conn, "users"));
        assert_eq!(manager.current()?, Some("19ca9d0b2b16"));
        Ok(())
    }

    #[test]
    fn test_downgrade_relative_steps() -> Result<()> {
        let conn = open();
        let manager = MigrationManager::new(&conn);
        manager.run_migrations()?;

        let reverted = manager.downgrade(&DowngradeTarget::Steps(1))?;

        assert_eq!(reverted, vec!["acf7562b405f"]);
        assert!(!table_exists(&conn, "users"));
        assert!(table_exists(&conn, "news_feeds"));
        assert_eq!(manager.current()?, Some("19ca9d0b2b16"));
        Ok(())
    }

    #[test]
    fn test_downgrade_to_base_removes_everything() -> Result<()> {
        let conn = open();
        let manager = MigrationManager::new(&conn);
        manager.run_migrations()?;

        manager.downgrade(&DowngradeTarget::Base)?;

        assert!(!table_exists(&conn, "news_articles"));
        assert!(!table_exists(&conn, "workflow_run_history"));
        assert_eq!(manager.current()?, None);
        Ok(())
    }

    #[test]
    fn test_downgrade_more_steps_than_applied_fails() -> Result<()> {
        let conn = open();
        let manager = MigrationManager::new(&conn);
        manager.upgrade("a36061e28468")?;

        assert!(manager.downgrade(&DowngradeTarget::Steps(2)).is_err());
        assert_eq!(manager.current()?, Some("a36061e28468"));
        Ok(())
    }

    #[test]
    fn test_users_migration_backfills_feed_owners() -> Result<()> {
        let conn = open();
        let manager = MigrationManager::new(&conn);
        manager.upgrade("19ca9d0b2b16")?;
        conn.execute(
            "INSERT INTO news_feeds (user_id, query_prompt, created_at) VALUES ('alice', 'rust news', '2025-01-01T00:00:00Z')",
            [],
        )?;

        manager.upgrade("head")?;

        let owners: i64 = conn.query_row("SELECT COUNT(*) FROM users WHERE user_id = 'alice'", [], |row| row.get(0))?;
        assert_eq!(owners, 1);
        let feeds: i64 = conn.query_row("SELECT COUNT(*) FROM news_feeds", [], |row| row.get(0))?;
        assert_eq!(feeds, 1);

        // The rebuilt table enforces the new foreign key
        let orphan = conn.execute(
            "INSERT INTO news_feeds (user_id, query_prompt, created_at) VALUES ('nobody', 'x', '2025-01-01T00:00:00Z')",
            [],
        );
        assert!(orphan.is_err());
        Ok(())
    }

    #[test]
    fn test_parse_downgrade_target() {
        assert_eq!(DowngradeTarget::parse("-2").unwrap(), DowngradeTarget::Steps(2));
        assert_eq!(DowngradeTarget::parse("base").unwrap(), DowngradeTarget::Base);
        assert_eq!(
            DowngradeTarget::parse("19ca9d0b2b16").unwrap(),
            DowngradeTarget::Revision("19ca9d0b2b16".to_string())
        );
        assert!(DowngradeTarget::parse("-0").is_err());
        assert!(DowngradeTarget::parse("-x").is_err());
    }

    #[test]
    fn test_unknown_revision_is_rejected() {
        let conn = open();
        let manager = MigrationManager::new(&conn);
        assert!(manager.upgrade("deadbeef").is_err());
    }
}
