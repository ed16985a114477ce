pub mod decoder;
pub mod google_news;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::llm::{invoke_structured, AIPrompt, LanguageModel, SystemPrompt};
use crate::models::NewsArticle;
use crate::news::time::parse_age_literal_to_seconds;

/// Describes one parameter a news source accepts, for planning prompts
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub type_name: &'static str,
    pub description: &'static str,
    /// `None` marks the parameter as required
    pub default: Option<&'static str>,
}

/// A place news articles can be collected from
#[async_trait]
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ParamSpec>;

    /// Collects articles; `params` is validated against the source's parameter type
    async fn fetch(&self, params: &Value) -> Result<Vec<NewsArticle>>;
}

/// Which source to query, with which parameters, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NewsSearchPlan {
    /// Name of the news source to search
    pub source_name: String,
    /// Parameters to pass to the news search function as JSON string
    #[serde(default = "empty_parameters")]
    pub parameters: String,
    /// Why this source was selected and how parameters were determined
    pub reasoning: String,
}

fn empty_parameters() -> String {
    "{}".to_string()
}

impl NewsSearchPlan {
    /// The plan's parameters as JSON; a blank string means no parameters
    pub fn parsed_parameters(&self) -> Result<Value> {
        if self.parameters.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&self.parameters)
            .with_context(|| format!("Invalid parameters for {}: {}", self.source_name, self.parameters))
    }
}

/// List of execution plans for a news search
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NewsSearchPlanList {
    /// List of source and parameters for a news search
    pub search_plans: Vec<NewsSearchPlan>,
}

/// Registered news sources, in registration order
pub struct NewsSourceRegistry {
    sources: Vec<Arc<dyn NewsSource>>,
    age_cap: String,
    max_sources: usize,
}

impl NewsSourceRegistry {
    pub fn new(age_cap: impl Into<String>, max_sources: usize) -> Self {
        Self {
            sources: Vec::new(),
            age_cap: age_cap.into(),
            max_sources,
        }
    }

    /// Registers a source, replacing any source with the same name
    pub fn register(&mut self, source: Arc<dyn NewsSource>) {
        match self.sources.iter().position(|s| s.name() == source.name()) {
            Some(index) => self.sources[index] = source,
            None => self.sources.push(source),
        }
    }

    pub fn get_source(&self, name: &str) -> Option<Arc<dyn NewsSource>> {
        self.sources.iter().find(|s| s.name() == name).cloned()
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Describes every source and its parameters for a planning prompt
    pub fn describe_sources_prompt(&self) -> Result<String> {
        if self.sources.is_empty() {
            return Err(anyhow!("No news sources registered"));
        }

        let mut parts = vec![
            "AVAILABLE NEWS SOURCES:".to_string(),
            "Each source below can be executed with specific parameters. Choose the most relevant source(s) based on the user's query.".to_string(),
            String::new(),
        ];

        for source in &self.sources {
            let mut desc = vec![
                format!("SOURCE: {}", source.name()),
                format!("DESCRIPTION: {}", source.description()),
            ];
            let params = source.parameters();
            if params.is_empty() {
                desc.push("PARAMETERS: None required".to_string());
            } else {
                desc.push("PARAMETERS:".to_string());
                for param in params {
                    let default = match param.default {
                        Some(value) => format!("[Default: {}]", value),
                        None => "[Required]".to_string(),
                    };
                    desc.push(format!(
                        "  - {} ({}): {} {}",
                        param.name, param.type_name, param.description, default
                    ));
                }
            }
            desc.push("USAGE: Select this source if it can be utilized to answer the user's query.".to_string());
            parts.push(desc.join("\n"));
            parts.push(String::new());
        }

        parts.extend([
            "PARAMETER FORMULATION:".to_string(),
            "Provide parameters as key-value in JSON string based on the user's specific requirements.".to_string(),
            String::new(),
            format!(
                "IMPORTANT: The number of sources chosen should not exceed the configured max number of news sources ({})",
                self.max_sources
            ),
            String::new(),
            "EXECUTION GUIDELINES:".to_string(),
            format!(
                "1. Choose up to {} source(s) that best match the user's news query intent",
                self.max_sources
            ),
            "2. Parameter optimization: For search-based sources, extract relevant keywords from the user's query".to_string(),
            "3. Provide clear reasoning for your source selection and parameter choices".to_string(),
            "4. Multiple sources can be used if the query spans different topics or requires comprehensive coverage".to_string(),
            "5. Override default parameters if needed to get more relevant results".to_string(),
        ]);

        Ok(parts.join("\n"))
    }

    /// Drops articles older than the age cap. An invalid cap keeps everything.
    pub fn filter_articles_by_age(&self, articles: Vec<NewsArticle>, now: i64) -> Vec<NewsArticle> {
        if self.age_cap.trim().is_empty() {
            return articles;
        }

        match parse_age_literal_to_seconds(&self.age_cap) {
            Ok(max_age) => {
                let cutoff = now - max_age;
                articles.into_iter().filter(|a| a.published_at >= cutoff).collect()
            }
            Err(e) => {
                error!("Error parsing age cap '{}': {}. Returning all articles.", self.age_cap, e);
                articles
            }
        }
    }

    /// Runs a source by name and applies the age cap
    pub async fn retrieve_news_articles_from_source(&self, source_name: &str, params: &Value) -> Result<Vec<NewsArticle>> {
        let source = self
            .get_source(source_name)
            .ok_or_else(|| anyhow!("News source {} not found", source_name))?;

        let articles = source
            .fetch(params)
            .await
            .with_context(|| format!("Error executing news source {}", source_name))?;

        let total = articles.len();
        let filtered = self.filter_articles_by_age(articles, Utc::now().timestamp());
        info!(
            "Retrieved total {} articles from {}, dropped old (AGE_CAP: {}) {} articles.",
            total,
            source_name,
            self.age_cap,
            total - filtered.len()
        );
        Ok(filtered)
    }

    /// Asks the model which sources to query, and with which parameters, for a query prompt
    pub async fn get_news_search_plans(
        &self,
        llm: &dyn LanguageModel,
        query_prompt: &str,
        system_prompt: &SystemPrompt,
    ) -> Result<Vec<NewsSearchPlan>> {
        let mut prompt = AIPrompt::new(system_prompt);
        prompt.add_task_prompt(&format!(
            "You are a news search planner. Given a user query, create a complete execution plan that includes:
1. Which news sources to use
2. What parameters to pass to each source
3. Reasoning for each selection

Available news source executor descriptions:
{}

User Query Prompt: I want to know about {}

IMPORTANT: You can use the same source multiple times with different parameters to get comprehensive coverage.

For example, if the query is about \"AI and climate change\", you could use:
- Google News Search with search_keyword=\"artificial intelligence\"
- Google News Search with search_keyword=\"climate change AI\"
- Google News Technology (for general tech coverage)
",
            self.describe_sources_prompt()?,
            query_prompt
        ));
        prompt.add_task_prompt(&format!("User Query: {}", query_prompt));

        let plans: NewsSearchPlanList = invoke_structured(llm, prompt.to_messages()).await?;

        if plans.search_plans.len() > self.max_sources {
            warn!(
                "Number of news search plans ({}) exceeds configured max number of news sources ({})",
                plans.search_plans.len(),
                self.max_sources
            );
        }
        Ok(plans.search_plans)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct EchoParam {
        keyword: String,
    }

    /// Returns a fixed list of articles
    pub struct StaticSource {
        pub name: &'static str,
        pub articles: Vec<NewsArticle>,
    }

    #[async_trait]
    impl NewsSource for StaticSource {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Static articles for tests"
        }

        fn parameters(&self) -> Vec<ParamSpec> {
            Vec::new()
        }

        async fn fetch(&self, _params: &Value) -> Result<Vec<NewsArticle>> {
            Ok(self.articles.clone())
        }
    }

    struct EchoSource;

    #[async_trait]
    impl NewsSource for EchoSource {
        fn name(&self) -> &str {
            "Echo"
        }

        fn description(&self) -> &str {
            "Echoes the keyword"
        }

        fn parameters(&self) -> Vec<ParamSpec> {
            vec![ParamSpec {
                name: "keyword",
                type_name: "str",
                description: "Keyword to echo",
                default: None,
            }]
        }

        async fn fetch(&self, params: &Value) -> Result<Vec<NewsArticle>> {
            let param: EchoParam = serde_json::from_value(params.clone())?;
            Ok(vec![NewsArticle::new(
                param.keyword,
                "https://example.com/echo",
                Utc::now().timestamp(),
                "echo",
            )])
        }
    }

    fn registry() -> NewsSourceRegistry {
        let mut registry = NewsSourceRegistry::new("1d", 2);
        registry.register(Arc::new(EchoSource));
        registry
    }

    #[test]
    fn test_describe_sources_lists_parameters() {
        let prompt = registry().describe_sources_prompt().unwrap();

        assert!(prompt.contains("SOURCE: Echo"));
        assert!(prompt.contains("  - keyword (str): Keyword to echo [Required]"));
        assert!(prompt.contains("Choose up to 2 source(s)"));
    }

    #[test]
    fn test_empty_registry_cannot_be_described() {
        assert!(NewsSourceRegistry::new("1d", 3).describe_sources_prompt().is_err());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = registry();
        registry.register(Arc::new(StaticSource { name: "Echo", articles: Vec::new() }));
        registry.register(Arc::new(StaticSource { name: "Other", articles: Vec::new() }));

        assert_eq!(registry.source_names(), vec!["Echo", "Other"]);
        assert_eq!(registry.get_source("Echo").unwrap().description(), "Static articles for tests");
    }

    #[test]
    fn test_filter_articles_by_age() {
        let now = 1_000_000;
        let articles = vec![
            NewsArticle::new("fresh", "https://a", now - 3_600, "s"),
            NewsArticle::new("stale", "https://b", now - 2 * 86_400, "s"),
        ];

        let kept = registry().filter_articles_by_age(articles.clone(), now);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "fresh");

        let lenient = NewsSourceRegistry::new("forever", 3).filter_articles_by_age(articles, now);
        assert_eq!(lenient.len(), 2);
    }

    #[tokio::test]
    async fn test_retrieve_validates_parameters() {
        let registry = registry();

        let articles = registry
            .retrieve_news_articles_from_source("Echo", &json!({"keyword": "rust"}))
            .await
            .unwrap();
        assert_eq!(articles[0].title, "rust");

        assert!(registry.retrieve_news_articles_from_source("Echo", &json!({})).await.is_err());
        assert!(registry.retrieve_news_articles_from_source("Missing", &json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_get_news_search_plans() {
        let model = ScriptedModel::new([r#"```json
{"search_plans": [
  {"source_name": "Echo", "parameters": "{\"keyword\": \"rust\"}", "reasoning": "direct match"},
  {"source_name": "Echo", "reasoning": "defaults"},
  {"source_name": "Echo", "parameters": "{}", "reasoning": "third"}
]}
```"#]);

        let plans = registry()
            .get_news_search_plans(&model, "rust programming", &SystemPrompt::default())
            .await
            .unwrap();

        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].parsed_parameters().unwrap()["keyword"], "rust");
        assert_eq!(plans[1].parameters, "{}");
        assert!(model.last_prompt().contains("User Query: rust programming"));
    }

    #[test]
    fn test_invalid_plan_parameters() {
        let plan = NewsSearchPlan {
            source_name: "Echo".to_string(),
            parameters: "keyword=rust".to_string(),
            reasoning: String::new(),
        };
        assert!(plan.parsed_parameters().is_err());
    }
}
