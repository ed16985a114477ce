use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::sync::Arc;

use crate::base::ArticleRepository;
use crate::models::{ArticleId, NewsArticle};
use crate::utils::{current_timestamp, format_db_timestamp};

pub(crate) const ARTICLE_COLUMNS: &str = "news_articles.id, news_articles.title, news_articles.url, \
    news_articles.published_at, news_articles.source, news_articles.content_markdown_path, \
    news_articles.thumbnail_url, news_articles.summary, news_articles.summary_short, \
    news_articles.keywords, news_articles.author";

// SQLite limits the number of bound parameters per statement
const URL_BATCH_SIZE: usize = 500;

pub struct SqliteArticleRepository {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl SqliteArticleRepository {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    /// Maps a row selected with `ARTICLE_COLUMNS`
    pub(crate) fn map_row(row: &Row) -> Result<NewsArticle> {
        let content_path: Option<String> = row.get(5)?;
        let summary: Option<String> = row.get(7)?;
        let keywords = row
            .get::<_, Option<String>>(9)?
            .map(|json| serde_json::from_str::<Vec<String>>(&json))
            .transpose()
            .context("Invalid keywords column")?;

        Ok(NewsArticle {
            id: Some(ArticleId(row.get(0)?)),
            title: row.get(1)?,
            url: row.get(2)?,
            published_at: row.get(3)?,
            source: row.get(4)?,
            is_hydrated: content_path.is_some() || summary.is_some(),
            raw_html: None,
            content: None,
            thumbnail_url: row.get(6)?,
            summary,
            summary_short: row.get(8)?,
            keywords,
            author: row.get(10)?,
        })
    }
}

impl ArticleRepository for SqliteArticleRepository {
    fn create_article(
        &self,
        article: &NewsArticle,
        raw_html_path: Option<&str>,
        content_markdown_path: Option<&str>,
    ) -> Result<ArticleId> {
        let keywords = article
            .keywords
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO news_articles (
                title, url, published_at, source, raw_html_path, content_markdown_path,
                thumbnail_url, summary, summary_short, keywords, author, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                article.title,
                article.url,
                article.published_at,
                article.source,
                raw_html_path,
                content_markdown_path,
                article.thumbnail_url,
                article.summary,
                article.summary_short,
                keywords,
                article.author,
                format_db_timestamp(current_timestamp()),
            ],
        )
        .with_context(|| format!("Failed to insert article {}", article.url))?;

        Ok(ArticleId(conn.last_insert_rowid()))
    }

    fn get_article(&self, id: ArticleId) -> Result<Option<NewsArticle>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM news_articles WHERE id = ?",
            ARTICLE_COLUMNS
        ))?;
        let row = stmt
            .query_row(params![id.0], |row| Ok(Self::map_row(row)))
            .optional()?;
        row.transpose()
    }

    fn get_article_by_url(&self, url: &str) -> Result<Option<NewsArticle>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM news_articles WHERE url = ?",
            ARTICLE_COLUMNS
        ))?;
        let row = stmt
            .query_row(params![url], |row| Ok(Self::map_row(row)))
            .optional()?;
        row.transpose()
    }

    fn get_articles_by_urls(&self, urls: &[String]) -> Result<Vec<NewsArticle>> {
        let conn = self.pool.get()?;
        let mut articles = Vec::new();

        for chunk in urls.chunks(URL_BATCH_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM news_articles WHERE url IN ({})",
                ARTICLE_COLUMNS, placeholders
            ))?;
            let mut rows = stmt.query(params_from_iter(chunk.iter()))?;
            while let Some(row) = rows.next()? {
                articles.push(Self::map_row(row)?);
            }
        }

        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use crate::data::Database;
    use crate::models::NewsArticle;

    fn hydrated(url: &str) -> NewsArticle {
        let mut article = NewsArticle::new("Rust 2.0 released", url, 1_700_000_000, "The Register");
        article.summary = Some("A long summary".to_string());
        article.summary_short = Some("Short".to_string());
        article.keywords = Some(vec!["rust".to_string(), "release".to_string()]);
        article.author = Some("Jane Doe".to_string());
        article
    }

    #[test]
    fn test_create_and_get_article() {
        let repo = Database::in_memory().unwrap().article_repository();

        let id = repo
            .create_article(&hydrated("https://example.com/a"), Some("html/a.html"), Some("md/a.md"))
            .unwrap();

        let stored = repo.get_article(id).unwrap().unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.source, "The Register");
        assert_eq!(stored.keywords, Some(vec!["rust".to_string(), "release".to_string()]));
        assert!(stored.is_hydrated);

        let by_url = repo.get_article_by_url("https://example.com/a").unwrap().unwrap();
        assert_eq!(by_url.id, Some(id));
    }

    #[test]
    fn test_url_is_unique() {
        let repo = Database::in_memory().unwrap().article_repository();

        repo.create_article(&hydrated("https://example.com/a"), None, None).unwrap();

        assert!(repo.create_article(&hydrated("https://example.com/a"), None, None).is_err());
    }

    #[test]
    fn test_get_articles_by_urls_returns_only_stored() {
        let repo = Database::in_memory().unwrap().article_repository();
        repo.create_article(&hydrated("https://example.com/a"), None, None).unwrap();
        repo.create_article(&hydrated("https://example.com/b"), None, None).unwrap();

        let found = repo
            .get_articles_by_urls(&[
                "https://example.com/a".to_string(),
                "https://example.com/missing".to_string(),
            ])
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://example.com/a");
        assert!(repo.get_articles_by_urls(&[]).unwrap().is_empty());
    }
}
