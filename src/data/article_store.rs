use anyhow::Result;
use log::info;
use serde_json::json;
use std::sync::Arc;

use crate::base::ArticleRepository;
use crate::data::object_store::{ContentMetadata, ObjectStore};
use crate::models::{FeedId, NewsArticle, NewsCuration};

/// Persists articles across the database and the object store
#[derive(Clone)]
pub struct ArticleStore {
    articles: Arc<dyn ArticleRepository>,
    objects: ObjectStore,
}

impl ArticleStore {
    pub fn new(articles: Arc<dyn ArticleRepository>, objects: ObjectStore) -> Self {
        Self { articles, objects }
    }

    /// Writes the article's HTML and Markdown content to the object store, then
    /// inserts the row pointing at them. Returns the article with its new id.
    pub async fn store_news_article(&self, article: &NewsArticle) -> Result<NewsArticle> {
        let metadata = ContentMetadata::for_article(&article.url);

        let html_path = match article.raw_html.as_deref() {
            Some(html) => self.objects.save_html(html, Some(&article.title), &metadata).await?,
            None => None,
        };
        let markdown_path = match article.content.as_deref() {
            Some(content) => self.objects.save_markdown(content, Some(&article.title), &metadata).await?,
            None => None,
        };

        let id = self
            .articles
            .create_article(article, html_path.as_deref(), markdown_path.as_deref())?;

        let mut stored = article.clone();
        stored.id = Some(id);
        Ok(stored)
    }

    /// Looks up a stored article by URL
    pub fn get_news_article_by_url(&self, url: &str) -> Result<Option<NewsArticle>> {
        self.articles.get_article_by_url(url)
    }

    /// Stored articles among `urls`
    pub fn get_news_articles_by_urls(&self, urls: &[String]) -> Result<Vec<NewsArticle>> {
        self.articles.get_articles_by_urls(urls)
    }

    /// Saves a curation result as JSON and returns its object key
    pub async fn store_curation_result(&self, feed_id: FeedId, curation: &NewsCuration) -> Result<Option<String>> {
        let content = json!({
            "query_prompt": curation.query_prompt,
            "articles": curation
                .items
                .iter()
                .map(|x| json!({
                    "title": x.item.title,
                    "url": x.item.url,
                    "summary": x.item.summary,
                    "scores": x.scores,
                }))
                .collect::<Vec<_>>(),
        });
        let filename = format!("curation_feed_{}_{}", feed_id, chrono::Utc::now().format("%H%M%S"));
        let path = self
            .objects
            .save_json(&content, Some(&filename), &ContentMetadata::default())
            .await?;
        if let Some(path) = &path {
            info!("Stored curation result for feed {} at {}", feed_id, path);
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::object_store::LocalFileSystemBackend;
    use crate::data::Database;
    use crate::models::{NewsCurationItem, RelevanceScore};
    use tempfile::tempdir;

    fn article_store(dir: &std::path::Path) -> ArticleStore {
        let database = Database::in_memory().unwrap();
        let objects = ObjectStore::new(Arc::new(LocalFileSystemBackend::new(dir)), "day");
        ArticleStore::new(database.article_repository(), objects)
    }

    #[tokio::test]
    async fn test_store_news_article_writes_content_and_row() {
        let dir = tempdir().unwrap();
        let store = article_store(dir.path());
        let mut article = NewsArticle::new("Tokio 2", "https://example.com/tokio", 1_700_000_000, "Blog");
        article.raw_html = Some("<html>tokio</html>".to_string());
        article.content = Some("tokio".to_string());
        article.summary = Some("A runtime".to_string());

        let stored = store.store_news_article(&article).await.unwrap();

        assert!(stored.id.is_some());
        assert!(dir.path().join("day/html/Tokio_2.html").exists());
        assert!(dir.path().join("day/markdown/Tokio_2.md").exists());

        let fetched = store.get_news_article_by_url("https://example.com/tokio").unwrap().unwrap();
        assert_eq!(fetched.id, stored.id);
        assert_eq!(fetched.summary.as_deref(), Some("A runtime"));
    }

    #[tokio::test]
    async fn test_store_curation_result() {
        let dir = tempdir().unwrap();
        let store = article_store(dir.path());
        let curation = NewsCuration {
            query_prompt: "rust".to_string(),
            items: vec![NewsCurationItem::from_relevance(
                NewsArticle::new("a", "https://example.com/a", 1, "src"),
                &RelevanceScore { relevance_score: 0.8, reasoning: "close".to_string() },
            )],
        };

        let path = store.store_curation_result(FeedId(7), &curation).await.unwrap().unwrap();

        assert!(path.starts_with("day/json/curation_feed_7_"));
        let saved = std::fs::read_to_string(dir.path().join(&path)).unwrap();
        assert!(saved.contains("\"query_prompt\":\"rust\""));
        assert!(saved.contains("\"url\":\"https://example.com/a\""));
    }
}
