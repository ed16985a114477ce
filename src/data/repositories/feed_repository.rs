use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

use crate::base::FeedRepository;
use crate::models::{FeedId, NewNewsFeed, NewsFeed};
use crate::utils::{current_timestamp, format_db_timestamp, parse_db_timestamp};

const FEED_COLUMNS: &str = "id, user_id, query_prompt, created_at, updated_at";

pub struct SqliteFeedRepository {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl SqliteFeedRepository {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn map_row(row: &Row) -> Result<NewsFeed> {
        Ok(NewsFeed {
            id: FeedId(row.get(0)?),
            user_id: row.get(1)?,
            query_prompt: row.get(2)?,
            created_at: parse_db_timestamp(&row.get::<_, String>(3)?)?,
            updated_at: row
                .get::<_, Option<String>>(4)?
                .map(|s| parse_db_timestamp(&s))
                .transpose()?,
        })
    }

    fn query_one(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Option<NewsFeed>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(sql)?;
        let row = stmt
            .query_row(params, |row| Ok(Self::map_row(row)))
            .optional()?;
        row.transpose()
    }
}

impl FeedRepository for SqliteFeedRepository {
    fn create_feed(&self, feed: &NewNewsFeed) -> Result<NewsFeed> {
        let conn = self.pool.get()?;
        let created_at = current_timestamp();
        conn.execute(
            "INSERT INTO news_feeds (user_id, query_prompt, created_at) VALUES (?, ?, ?)",
            params![feed.user_id, feed.query_prompt, format_db_timestamp(created_at)],
        )
        .with_context(|| format!("Failed to insert feed for user '{}'", feed.user_id))?;

        Ok(NewsFeed {
            id: FeedId(conn.last_insert_rowid()),
            user_id: feed.user_id.clone(),
            query_prompt: feed.query_prompt.clone(),
            created_at,
            updated_at: None,
        })
    }

    fn get_feed_by_id(&self, id: FeedId) -> Result<Option<NewsFeed>> {
        self.query_one(
            &format!("SELECT {} FROM news_feeds WHERE id = ?", FEED_COLUMNS),
            params![id.0],
        )
    }

    fn find_feed(&self, user_id: &str, query_prompt: &str) -> Result<Option<NewsFeed>> {
        self.query_one(
            &format!(
                "SELECT {} FROM news_feeds WHERE user_id = ? AND query_prompt = ? ORDER BY id LIMIT 1",
                FEED_COLUMNS
            ),
            params![user_id, query_prompt],
        )
    }

    fn get_feeds_by_user(&self, user_id: &str) -> Result<Vec<NewsFeed>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM news_feeds WHERE user_id = ? ORDER BY id",
            FEED_COLUMNS
        ))?;
        let mut rows = stmt.query(params![user_id])?;

        let mut feeds = Vec::new();
        while let Some(row) = rows.next()? {
            feeds.push(Self::map_row(row)?);
        }
        Ok(feeds)
    }

    fn delete_feed(&self, id: FeedId) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM news_feeds WHERE id = ?", params![id.0])?;
        Ok(())
    }
}
