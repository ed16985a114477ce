use anyhow::{bail, Result};
use log::{debug, info, warn};
use std::sync::Arc;

use super::scorer::RelevancyScorer;
use crate::llm::{LanguageModel, SystemPrompt};
use crate::models::{NewsArticle, NewsCuration, NewsCurationItem};

/// Selects and orders the articles that fit a feed's query prompt
pub struct FeedCurator {
    relevancy_scorer: RelevancyScorer,
}

impl FeedCurator {
    pub fn new(llm: Arc<dyn LanguageModel>, system_prompt: Option<SystemPrompt>) -> Self {
        Self {
            relevancy_scorer: RelevancyScorer::new(llm, system_prompt),
        }
    }

    /// Scores `articles` batch by batch (all at once when `max_articles_per_batch` is `None`)
    /// and returns those scoring at least `min_relevance_score`, most relevant first.
    pub async fn curate_news_feed(
        &self,
        query_prompt: &str,
        articles: Vec<NewsArticle>,
        min_relevance_score: f64,
        max_articles_per_batch: Option<usize>,
    ) -> Result<NewsCuration> {
        if query_prompt.trim().is_empty() {
            bail!("Query prompt must not be empty");
        }

        info!(
            "Starting news curation job; query_prompt: \"{}\"; considering {} articles; articles per batch: {:?}",
            query_prompt.chars().take(100).collect::<String>(),
            articles.len(),
            max_articles_per_batch
        );

        let batch_size = max_articles_per_batch.filter(|n| *n > 0).unwrap_or(articles.len().max(1));
        let batches: Vec<Vec<NewsArticle>> = articles.chunks(batch_size).map(<[NewsArticle]>::to_vec).collect();

        let mut relevant = Vec::new();
        for (i, batch) in batches.into_iter().enumerate() {
            debug!("Scoring batch ({}) of {} articles", i + 1, batch.len());
            let scored = self
                .relevancy_scorer
                .filter_by_relevance_score(batch, query_prompt, min_relevance_score)
                .await?;
            debug!("Found {} relevant articles in batch", scored.len());
            relevant.extend(scored);
        }

        if relevant.is_empty() {
            warn!("No articles met the minimum relevance criteria");
        }

        relevant.sort_by(|a, b| b.1.relevance_score.total_cmp(&a.1.relevance_score));

        Ok(NewsCuration {
            query_prompt: query_prompt.to_string(),
            items: relevant
                .into_iter()
                .map(|(article, score)| NewsCurationItem::from_relevance(article, &score))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    fn articles(titles: &[&str]) -> Vec<NewsArticle> {
        titles
            .iter()
            .map(|t| NewsArticle::new(*t, format!("https://example.com/{}", t), 0, "Example"))
            .collect()
    }

    fn score(value: f64) -> String {
        format!(r#"{{"relevance_score": {}, "reasoning": "r{}"}}"#, value, value)
    }

    #[tokio::test]
    async fn test_curation_is_sorted_and_filtered() {
        let model = Arc::new(ScriptedModel::new([score(0.6), score(0.2), score(0.9)]));
        let curator = FeedCurator::new(model.clone(), None);

        let curation = curator
            .curate_news_feed("rust news", articles(&["a", "b", "c"]), 0.5, Some(2))
            .await
            .unwrap();

        let titles: Vec<&str> = curation.items.iter().map(|i| i.item.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "a"]);
        assert_eq!(curation.items[0].scores["relevance"]["score"], 0.9);
        assert_eq!(curation.items[0].scores["relevance"]["reasoning"], "r0.9");
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn test_no_relevant_articles_gives_empty_curation() {
        let model = Arc::new(ScriptedModel::new([score(0.1)]));
        let curator = FeedCurator::new(model, None);

        let curation = curator.curate_news_feed("rust", articles(&["a"]), 0.5, None).await.unwrap();

        assert!(curation.items.is_empty());
        assert_eq!(curation.query_prompt, "rust");
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        let curator = FeedCurator::new(model, None);

        assert!(curator.curate_news_feed("  ", articles(&["a"]), 0.5, None).await.is_err());
    }
}
