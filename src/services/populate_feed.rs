use anyhow::{anyhow, Result};
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::base::{FeedItemRepository, FeedRepository};
use crate::data::ArticleStore;
use crate::feed::FeedCurator;
use crate::llm::{LanguageModel, SystemPrompt};
use crate::models::{FeedId, NewsArticle};
use crate::news::{ArticleReader, NewsSearchPlan, NewsSourceRegistry, ReaderError};

/// Outcome of `populate_feed`, stored as the workflow run's output
#[derive(Debug, Clone, Serialize)]
pub struct PopulateFeedResult {
    pub feed_id: FeedId,

    pub feed_query_prompt: String,

    /// Searches the planner chose for this feed
    pub news_search_plans: Vec<NewsSearchPlan>,

    /// Articles returned by all search plans together, before removing duplicate URLs
    pub articles_retrieved: usize,

    /// Articles newly linked to the feed
    pub articles_curated: usize,

    /// Set when the run ended without curating, e.g. no plans or no articles
    pub error_message: Option<String>,
}

/// Thresholds for the curation step
#[derive(Debug, Clone, Copy)]
pub struct CurationSettings {
    /// Articles scoring below this are left out of the feed
    pub min_relevance_score: f64,

    /// How many articles are scored per batch
    pub max_articles_per_batch: usize,
}

/// Fills a feed with fresh, read and curated articles
pub struct PopulateFeedService {
    feeds: Arc<dyn FeedRepository>,
    feed_items: Arc<dyn FeedItemRepository>,
    article_store: ArticleStore,
    registry: Arc<NewsSourceRegistry>,
    planner: Arc<dyn LanguageModel>,
    reader: Arc<dyn ArticleReader>,
    curator: FeedCurator,
    system_prompt: SystemPrompt,
    settings: CurationSettings,
}

impl PopulateFeedService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feeds: Arc<dyn FeedRepository>,
        feed_items: Arc<dyn FeedItemRepository>,
        article_store: ArticleStore,
        registry: Arc<NewsSourceRegistry>,
        planner: Arc<dyn LanguageModel>,
        reader: Arc<dyn ArticleReader>,
        curator: FeedCurator,
        settings: CurationSettings,
    ) -> Self {
        Self {
            feeds,
            feed_items,
            article_store,
            registry,
            planner,
            reader,
            curator,
            system_prompt: SystemPrompt::default(),
            settings,
        }
    }

    /// Plans searches for the feed's query, retrieves and reads new articles, curates them
    /// and links the relevant ones to the feed.
    ///
    /// An unknown feed is an error. Runs that stop early report why in `error_message`.
    pub async fn populate_feed(&self, feed_id: FeedId) -> Result<PopulateFeedResult> {
        let feed = self
            .feeds
            .get_feed_by_id(feed_id)?
            .ok_or_else(|| anyhow!("Feed with id {} not found", feed_id))?;

        let mut result = PopulateFeedResult {
            feed_id,
            feed_query_prompt: feed.query_prompt.clone(),
            news_search_plans: Vec::new(),
            articles_retrieved: 0,
            articles_curated: 0,
            error_message: None,
        };

        let plans = self
            .registry
            .get_news_search_plans(self.planner.as_ref(), &feed.query_prompt, &self.system_prompt)
            .await?;
        if plans.is_empty() {
            result.error_message = Some("No news search plans found".to_string());
            return Ok(result);
        }
        for plan in &plans {
            debug!(
                "News Source: {}, Parameters: {}, Reasoning: {}",
                plan.source_name, plan.parameters, plan.reasoning
            );
        }
        result.news_search_plans = plans.clone();

        let (retrieved, retrieved_count) = self.retrieve_articles(&plans).await;
        result.articles_retrieved = retrieved_count;
        if retrieved.is_empty() {
            result.error_message = Some("No articles retrieved from the news search plans".to_string());
            return Ok(result);
        }

        let candidates = self.drop_linked_articles(feed_id, retrieved)?;
        let articles = self.read_and_store_articles(candidates).await?;
        if articles.is_empty() {
            result.error_message = Some("No new accessible articles to curate".to_string());
            return Ok(result);
        }

        let curation = self
            .curator
            .curate_news_feed(
                &feed.query_prompt,
                articles,
                self.settings.min_relevance_score,
                Some(self.settings.max_articles_per_batch),
            )
            .await?;
        self.article_store.store_curation_result(feed_id, &curation).await?;

        let links = curation
            .items
            .iter()
            .map(|item| {
                item.item
                    .id
                    .map(|article_id| (article_id, Some(item.scores.clone())))
                    .ok_or_else(|| anyhow!("Curated article {} has not been stored", item.item.url))
            })
            .collect::<Result<Vec<_>>>()?;
        self.feed_items.add_feed_items(feed_id, &links)?;
        result.articles_curated = curation.items.len();

        info!(
            "Successfully curated {} articles for feed {} with query prompt {}",
            result.articles_curated, feed_id, feed.query_prompt
        );
        Ok(result)
    }

    /// Runs every plan concurrently; a failing plan contributes nothing.
    /// Articles are de-duplicated by URL, first occurrence wins. Also returns the
    /// number of articles retrieved before de-duplication.
    async fn retrieve_articles(&self, plans: &[NewsSearchPlan]) -> (Vec<NewsArticle>, usize) {
        let retrievals = plans.iter().map(|plan| async move {
            info!(
                "Retrieving articles from {} with parameters {}",
                plan.source_name, plan.parameters
            );
            let params = plan.parsed_parameters()?;
            self.registry
                .retrieve_news_articles_from_source(&plan.source_name, &params)
                .await
        });

        let mut seen = HashSet::new();
        let mut articles = Vec::new();
        let mut retrieved = 0;
        for (plan, outcome) in plans.iter().zip(join_all(retrievals).await) {
            match outcome {
                Ok(batch) => {
                    if batch.is_empty() {
                        warn!(
                            "No articles found from {} with parameters {}",
                            plan.source_name, plan.parameters
                        );
                    }
                    retrieved += batch.len();
                    articles.extend(batch.into_iter().filter(|a| seen.insert(a.url.clone())));
                }
                Err(e) => error!("Error retrieving articles from {}: {:#}", plan.source_name, e),
            }
        }
        (articles, retrieved)
    }

    fn drop_linked_articles(&self, feed_id: FeedId, articles: Vec<NewsArticle>) -> Result<Vec<NewsArticle>> {
        let urls: Vec<String> = articles.iter().map(|a| a.url.clone()).collect();
        let stored: HashMap<String, NewsArticle> = self
            .article_store
            .get_news_articles_by_urls(&urls)?
            .into_iter()
            .map(|a| (a.url.clone(), a))
            .collect();

        let mut candidates = Vec::with_capacity(articles.len());
        for article in articles {
            let linked = match stored.get(&article.url).and_then(|a| a.id) {
                Some(article_id) => self.feed_items.feed_item_exists(feed_id, article_id)?,
                None => false,
            };
            if linked {
                debug!("Article {} is already in feed {}, skipping", article.url, feed_id);
            } else {
                candidates.push(article);
            }
        }
        Ok(candidates)
    }

    /// Reuses stored articles and reads the rest; inaccessible articles are skipped
    async fn read_and_store_articles(&self, articles: Vec<NewsArticle>) -> Result<Vec<NewsArticle>> {
        let total = articles.len();
        let mut ready = Vec::with_capacity(total);

        for (i, article) in articles.into_iter().enumerate() {
            debug!("({}/{}) AI is reading article \"{}\" - {}", i + 1, total, article.title, article.url);

            if let Some(stored) = self.article_store.get_news_article_by_url(&article.url)? {
                debug!("Article {} already exists in DB, skipping read", article.url);
                ready.push(stored);
                continue;
            }

            match self.reader.read_article(article).await {
                Ok(hydrated) => ready.push(self.article_store.store_news_article(&hydrated).await?),
                Err(ReaderError::ArticleNotAccessible(reason)) => {
                    debug!("Skipping article as content is not accessible: {}", reason);
                }
                Err(ReaderError::Llm(e)) => warn!("Skipping article after model failure: {}", e),
            }
        }
        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::object_store::{LocalFileSystemBackend, ObjectStore};
    use crate::data::Database;
    use crate::llm::testing::ScriptedModel;
    use crate::models::NewNewsFeed;
    use crate::news::source::tests::StaticSource;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Hydrates every article except those whose URL contains "paywall"
    struct FakeReader {
        reads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ArticleReader for FakeReader {
        async fn read_article(&self, mut article: NewsArticle) -> Result<NewsArticle, ReaderError> {
            self.reads.lock().unwrap().push(article.url.clone());
            if article.url.contains("paywall") {
                return Err(ReaderError::ArticleNotAccessible("paywall".to_string()));
            }
            article.summary = Some(format!("Summary of {}", article.title));
            article.content = Some(format!("Content of {}", article.title));
            article.is_hydrated = true;
            Ok(article)
        }
    }

    struct Fixture {
        dir: TempDir,
        database: Database,
        reader: Arc<FakeReader>,
        feed_id: FeedId,
    }

    impl Fixture {
        fn new() -> Self {
            let database = Database::in_memory().unwrap();
            database.user_repository().create_user("alice").unwrap();
            let feed = database
                .feed_repository()
                .create_feed(&NewNewsFeed::new("alice", "Rust news"))
                .unwrap();
            Self {
                dir: TempDir::new().unwrap(),
                database,
                reader: Arc::new(FakeReader { reads: Mutex::new(Vec::new()) }),
                feed_id: feed.id,
            }
        }

        fn service(&self, model: Arc<ScriptedModel>) -> PopulateFeedService {
            let now = Utc::now().timestamp();
            let mut registry = NewsSourceRegistry::new("30d", 3);
            registry.register(Arc::new(StaticSource {
                name: "Tech",
                articles: vec![
                    NewsArticle::new("Rust 2.0", "https://example.com/rust", now, "Example"),
                    NewsArticle::new("Paywalled", "https://example.com/paywall", now, "Example"),
                    NewsArticle::new("Cooking", "https://example.com/cooking", now, "Example"),
                ],
            }));
            registry.register(Arc::new(StaticSource {
                name: "Search",
                articles: vec![NewsArticle::new("Rust 2.0", "https://example.com/rust", now, "Example")],
            }));

            let objects = ObjectStore::new(Arc::new(LocalFileSystemBackend::new(self.dir.path())), "day");
            PopulateFeedService::new(
                self.database.feed_repository(),
                self.database.feed_item_repository(),
                ArticleStore::new(self.database.article_repository(), objects),
                Arc::new(registry),
                model.clone(),
                self.reader.clone(),
                FeedCurator::new(model, None),
                CurationSettings { min_relevance_score: 0.6, max_articles_per_batch: 10 },
            )
        }
    }

    const PLANS: &str = r#"{"search_plans": [
        {"source_name": "Tech", "parameters": "{}", "reasoning": "general"},
        {"source_name": "Search", "parameters": "{}", "reasoning": "specific"},
        {"source_name": "Missing", "parameters": "{}", "reasoning": "broken"}
    ]}"#;

    fn score(value: f64) -> String {
        format!(r#"{{"relevance_score": {}, "reasoning": "because"}}"#, value)
    }

    #[tokio::test]
    async fn test_populate_feed_pipeline() {
        let fixture = Fixture::new();
        let model = Arc::new(ScriptedModel::new([PLANS.to_string(), score(0.9), score(0.1)]));

        let result = fixture.service(model).populate_feed(fixture.feed_id).await.unwrap();

        assert!(result.error_message.is_none(), "{:?}", result.error_message);
        assert_eq!(result.news_search_plans.len(), 3);
        // Tech returns 3 and Search repeats one of them
        assert_eq!(result.articles_retrieved, 4);
        assert_eq!(result.articles_curated, 1);
        assert_eq!(fixture.reader.reads.lock().unwrap().len(), 3);

        let articles = fixture.database.feed_item_repository().get_feed_articles(fixture.feed_id).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, "https://example.com/rust");

        let items = fixture.database.feed_item_repository().get_feed_items(fixture.feed_id).unwrap();
        assert_eq!(items[0].curation_scores.as_ref().unwrap()["relevance"]["score"], 0.9);
    }

    #[tokio::test]
    async fn test_second_run_skips_linked_and_reuses_stored_articles() {
        let fixture = Fixture::new();
        let first = Arc::new(ScriptedModel::new([PLANS.to_string(), score(0.9), score(0.1)]));
        fixture.service(first).populate_feed(fixture.feed_id).await.unwrap();

        let second = Arc::new(ScriptedModel::new([PLANS.to_string(), score(0.7)]));
        let result = fixture.service(second.clone()).populate_feed(fixture.feed_id).await.unwrap();

        assert_eq!(result.articles_curated, 1);
        // Rust is already linked; only Cooking is scored again, from its stored row
        assert_eq!(second.call_count(), 2);
        let reads = fixture.reader.reads.lock().unwrap().clone();
        assert_eq!(reads.iter().filter(|u| u.ends_with("/cooking")).count(), 1);
        let articles = fixture.database.feed_item_repository().get_feed_articles(fixture.feed_id).unwrap();
        assert_eq!(articles.len(), 2);
    }

    #[tokio::test]
    async fn test_no_plans_is_reported() {
        let fixture = Fixture::new();
        let model = Arc::new(ScriptedModel::new([r#"{"search_plans": []}"#]));

        let result = fixture.service(model).populate_feed(fixture.feed_id).await.unwrap();

        assert_eq!(result.error_message.as_deref(), Some("No news search plans found"));
    }

    #[tokio::test]
    async fn test_unknown_feed_is_error() {
        let fixture = Fixture::new();
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));

        assert!(fixture.service(model).populate_feed(FeedId(999)).await.is_err());
    }
}
