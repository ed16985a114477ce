use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::article::NewsArticle;

/// Relevance of one article to a feed query, as judged by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RelevanceScore {
    /// Relevance score from 0.0 to 1.0, where 1.0 is most relevant
    pub relevance_score: f64,
    /// Brief explanation of why this score was assigned
    pub reasoning: String,
}

/// An article selected for a feed together with its scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsCurationItem {
    pub item: NewsArticle,
    pub scores: serde_json::Value,
}

impl NewsCurationItem {
    pub fn from_relevance(item: NewsArticle, relevance: &RelevanceScore) -> Self {
        Self {
            item,
            scores: serde_json::json!({
                "relevance": {
                    "score": relevance.relevance_score,
                    "reasoning": relevance.reasoning,
                }
            }),
        }
    }

    pub fn relevance_score(&self) -> Option<f64> {
        self.scores["relevance"]["score"].as_f64()
    }
}

/// Curated selection of articles for a query prompt, most relevant first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsCuration {
    pub query_prompt: String,
    pub items: Vec<NewsCurationItem>,
}
