use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use std::sync::Arc;

use super::article_repository::{SqliteArticleRepository, ARTICLE_COLUMNS};
use crate::base::FeedItemRepository;
use crate::models::{ArticleId, FeedId, NewsArticle, NewsFeedItem};
use crate::utils::{current_timestamp, format_db_timestamp, parse_db_timestamp};

pub struct SqliteFeedItemRepository {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl SqliteFeedItemRepository {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn map_row(row: &Row) -> Result<NewsFeedItem> {
        Ok(NewsFeedItem {
            id: row.get(0)?,
            news_feed_id: FeedId(row.get(1)?),
            news_article_id: ArticleId(row.get(2)?),
            curation_scores: row
                .get::<_, Option<String>>(3)?
                .map(|json| serde_json::from_str(&json))
                .transpose()
                .context("Invalid curation_scores column")?,
            created_at: parse_db_timestamp(&row.get::<_, String>(4)?)?,
        })
    }
}

impl FeedItemRepository for SqliteFeedItemRepository {
    fn add_feed_item(
        &self,
        feed_id: FeedId,
        article_id: ArticleId,
        curation_scores: Option<&serde_json::Value>,
    ) -> Result<bool> {
        let scores = curation_scores.map(serde_json::to_string).transpose()?;
        let conn = self.pool.get()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO news_feed_items (news_feed_id, news_article_id, curation_scores, created_at)
                 VALUES (?, ?, ?, ?)",
                params![feed_id.0, article_id.0, scores, format_db_timestamp(current_timestamp())],
            )
            .with_context(|| format!("Failed to link article {} to feed {}", article_id, feed_id))?;
        Ok(inserted > 0)
    }

    fn add_feed_items(&self, feed_id: FeedId, items: &[(ArticleId, Option<serde_json::Value>)]) -> Result<usize> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let created_at = format_db_timestamp(current_timestamp());

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO news_feed_items (news_feed_id, news_article_id, curation_scores, created_at)
                 VALUES (?, ?, ?, ?)",
            )?;
            for (article_id, scores) in items {
                let scores = scores.as_ref().map(serde_json::to_string).transpose()?;
                inserted += stmt
                    .execute(params![feed_id.0, article_id.0, scores, created_at])
                    .with_context(|| format!("Failed to link article {} to feed {}", article_id, feed_id))?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn feed_item_exists(&self, feed_id: FeedId, article_id: ArticleId) -> Result<bool> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM news_feed_items WHERE news_feed_id = ? AND news_article_id = ?",
            params![feed_id.0, article_id.0],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn get_feed_items(&self, feed_id: FeedId) -> Result<Vec<NewsFeedItem>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, news_feed_id, news_article_id, curation_scores, created_at
             FROM news_feed_items WHERE news_feed_id = ? ORDER BY id",
        )?;
        let mut rows = stmt.query(params![feed_id.0])?;

        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(Self::map_row(row)?);
        }
        Ok(items)
    }

    fn get_feed_articles(&self, feed_id: FeedId) -> Result<Vec<NewsArticle>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM news_articles
             JOIN news_feed_items ON news_feed_items.news_article_id = news_articles.id
             WHERE news_feed_items.news_feed_id = ?
             ORDER BY news_articles.published_at DESC",
            ARTICLE_COLUMNS
        ))?;
        let mut rows = stmt.query(params![feed_id.0])?;

        let mut articles = Vec::new();
        while let Some(row) = rows.next()? {
            articles.push(SqliteArticleRepository::map_row(row)?);
        }
        Ok(articles)
    }
}
