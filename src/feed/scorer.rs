use anyhow::{bail, Result};
use log::debug;
use std::sync::Arc;

use crate::llm::{invoke_structured, AIPrompt, LanguageModel, SystemPrompt};
use crate::models::{NewsArticle, RelevanceScore};

/// Scores how relevant an article is to a feed's query prompt
pub struct RelevancyScorer {
    llm: Arc<dyn LanguageModel>,
    system_prompt: SystemPrompt,
}

impl RelevancyScorer {
    pub fn new(llm: Arc<dyn LanguageModel>, system_prompt: Option<SystemPrompt>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.unwrap_or_default(),
        }
    }

    pub async fn score_article(&self, article: &NewsArticle, query_prompt: &str) -> Result<RelevanceScore> {
        let mut prompt = AIPrompt::new(&self.system_prompt);
        prompt.add_task_prompt(&scoring_task(article, query_prompt));

        let score: RelevanceScore = invoke_structured(self.llm.as_ref(), prompt.to_messages()).await?;
        if !(0.0..=1.0).contains(&score.relevance_score) {
            bail!(
                "Relevance score {} for '{}' is outside [0.0, 1.0]",
                score.relevance_score,
                article.url
            );
        }
        debug!("Scored '{}' at {:.2}", article.title, score.relevance_score);
        Ok(score)
    }

    /// Scores each article in order and keeps those scoring at least `min_score`
    pub async fn filter_by_relevance_score(
        &self,
        articles: Vec<NewsArticle>,
        query_prompt: &str,
        min_score: f64,
    ) -> Result<Vec<(NewsArticle, RelevanceScore)>> {
        let mut relevant = Vec::new();
        for article in articles {
            let score = self.score_article(&article, query_prompt).await?;
            if score.relevance_score >= min_score {
                relevant.push((article, score));
            }
        }
        Ok(relevant)
    }
}

fn scoring_task(article: &NewsArticle, query_prompt: &str) -> String {
    format!(
        "Score the relevance of this news article to the given query prompt.

User Query Prompt: I want to know about {}

Article Details:
- Title: {}
- Summary: {}
- Keywords: {}
- URL: {}

Provide a relevance score from 0.0 to 1.0 using this two-step approach:

STEP 1 - Base Relevancy (determines tier):
- 0.8 = Highly relevant with strong connection to query topic
- 0.6 = Moderately relevant with some connection to query topic
- 0.4 = Tangentially related to query topic
- 0.0-0.3 = Not relevant or off-topic

Consider for base relevancy:
1. Direct topic match - Does the article address the query topic?
2. Content depth and quality - Is this substantial, well-written content?
3. Keyword alignment - How well do article keywords match query intent?
4. Source credibility - Is this from a reputable source?

STEP 2 - User Interest Boost:
If the article would genuinely engage and interest someone asking this query, add +0.1 to the base score:
- 0.8 -> 0.9 or 1.0 (highly relevant + engaging)
- 0.6 -> 0.7 (moderately relevant + engaging)
- 0.4 -> 0.5 (tangentially relevant + engaging)

Consider for user interest boost:
- Uniqueness of insights, surprising angles, practical implications, compelling narratives
- Would this article be genuinely fascinating vs dry/routine for someone with this query?

Provide clear reasoning that explains both the base relevancy tier and whether the user interest boost applies.
",
        query_prompt,
        article.title,
        article.summary.as_deref().unwrap_or_default(),
        article.keywords.as_deref().unwrap_or_default().join(", "),
        article.url
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    fn article(title: &str) -> NewsArticle {
        let mut article = NewsArticle::new(title, format!("https://example.com/{}", title), 0, "Example");
        article.summary = Some(format!("About {}", title));
        article.keywords = Some(vec!["rust".to_string(), "async".to_string()]);
        article
    }

    #[tokio::test]
    async fn test_score_article_builds_prompt() {
        let model = Arc::new(ScriptedModel::new([r#"{"relevance_score": 0.8, "reasoning": "on topic"}"#]));
        let scorer = RelevancyScorer::new(model.clone(), None);

        let score = scorer.score_article(&article("tokio"), "async Rust").await.unwrap();

        assert_eq!(score.relevance_score, 0.8);
        let prompt = model.last_prompt();
        assert!(prompt.contains("I want to know about async Rust"));
        assert!(prompt.contains("- Keywords: rust, async"));
        assert!(prompt.contains("- URL: https://example.com/tokio"));
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_error() {
        let model = Arc::new(ScriptedModel::new([r#"{"relevance_score": 1.4, "reasoning": "very"}"#]));
        let scorer = RelevancyScorer::new(model, None);

        assert!(scorer.score_article(&article("tokio"), "async Rust").await.is_err());
    }

    #[tokio::test]
    async fn test_filter_keeps_scores_at_or_above_minimum() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"relevance_score": 0.6, "reasoning": "a"}"#,
            r#"{"relevance_score": 0.3, "reasoning": "b"}"#,
            r#"{"relevance_score": 0.9, "reasoning": "c"}"#,
        ]));
        let scorer = RelevancyScorer::new(model, None);

        let kept = scorer
            .filter_by_relevance_score(vec![article("a"), article("b"), article("c")], "q", 0.6)
            .await
            .unwrap();

        let titles: Vec<&str> = kept.iter().map(|(a, _)| a.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c"]);
    }
}
