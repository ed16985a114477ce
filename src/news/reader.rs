use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use super::source::google_news::BROWSER_USER_AGENT;
use super::text::{extract_og_image, html_to_text, truncate_to_token_budget};
use crate::config::Config;
use crate::llm::{count_tokens, invoke_structured, AIPrompt, LanguageModel, LlmError, SystemPrompt};
use crate::models::NewsArticle;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("article content not accessible: {0}")]
    ArticleNotAccessible(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// What the model extracts from an article's text
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ArticleContentExtraction {
    /// A concise, headline-style summary of the article
    #[serde(default)]
    pub summary: String,
    /// A shorter summary (1-2 sentences) highlighting the key point of the article
    #[serde(default)]
    pub summary_short: String,
    /// The author name if mentioned in the text, otherwise None
    #[serde(default)]
    pub author: String,
    /// Relevant keywords/tags for the article
    #[serde(default)]
    pub keywords: Vec<String>,
    /// False if the content is behind a paywall or subscription barrier, or otherwise insufficient to summarize
    pub is_content_sufficient: bool,
    /// Reasoning for the is_content_sufficient field
    #[serde(default)]
    pub is_content_sufficient_reasoning: String,
}

#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub max_content_tokens: usize,
    pub keywords_min_count: usize,
    pub keywords_max_count: usize,
    pub summary_min_words: usize,
    pub summary_max_words: usize,
}

impl ReaderSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_content_tokens: config.article_parser_content_max_token_length,
            keywords_min_count: config.article_keywords_min_count,
            keywords_max_count: config.article_keywords_max_count,
            summary_min_words: config.article_summary_min_word_count,
            summary_max_words: config.article_summary_max_word_count,
        }
    }
}

/// Turns a collected article into a hydrated one
#[async_trait]
pub trait ArticleReader: Send + Sync {
    async fn read_article(&self, article: NewsArticle) -> Result<NewsArticle, ReaderError>;
}

/// Downloads article pages and hydrates articles with an LLM-written summary
pub struct NewsArticleReader {
    client: Client,
    llm: Arc<dyn LanguageModel>,
    system_prompt: SystemPrompt,
    settings: ReaderSettings,
}

impl NewsArticleReader {
    pub fn new(
        client: Client,
        llm: Arc<dyn LanguageModel>,
        system_prompt: Option<SystemPrompt>,
        settings: ReaderSettings,
    ) -> Self {
        Self {
            client,
            llm,
            system_prompt: system_prompt.unwrap_or_default(),
            settings,
        }
    }

    async fn download(&self, url: &str) -> reqwest::Result<String> {
        self.client
            .get(url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    /// Fills in the article from an already downloaded page
    pub async fn hydrate(&self, mut article: NewsArticle, html: String) -> Result<NewsArticle, ReaderError> {
        let text = html_to_text(&html);
        if text.is_empty() {
            return Err(ReaderError::ArticleNotAccessible(format!(
                "No text content found from html for article: {}",
                article.url
            )));
        }
        debug!("Extracted {} tokens of text from article HTML", count_tokens(&text));

        let extraction = self.extract_content(&article.title, &article.source, &text).await?;
        if !extraction.is_content_sufficient {
            return Err(ReaderError::ArticleNotAccessible(format!(
                "Article content is not accessible: {}",
                extraction.is_content_sufficient_reasoning
            )));
        }

        let author = extraction.author.trim();
        let mut keywords = extraction.keywords;
        keywords.truncate(self.settings.keywords_max_count);

        article.thumbnail_url = extract_og_image(&html);
        article.raw_html = Some(html);
        article.content = Some(text);
        article.summary = Some(extraction.summary);
        article.summary_short = Some(extraction.summary_short).filter(|s| !s.is_empty());
        article.author = (!author.is_empty() && author != "None").then(|| author.to_string());
        article.keywords = Some(keywords);
        article.is_hydrated = true;

        info!(
            "Article Reader completed processing article \"{}\" with summary: \"{}...\"",
            article.title,
            article.summary.as_deref().unwrap_or_default().chars().take(100).collect::<String>()
        );
        Ok(article)
    }

    async fn extract_content(&self, title: &str, source: &str, text: &str) -> Result<ArticleContentExtraction, LlmError> {
        let max_tokens = self.settings.max_content_tokens;
        let content_tokens = count_tokens(text);
        let text = if content_tokens > max_tokens {
            info!(
                "Article content ({} tokens) exceeds max token limit ({}). Truncating.",
                content_tokens, max_tokens
            );
            let truncated = truncate_to_token_budget(text, max_tokens);
            info!("Truncated content to {} tokens", count_tokens(&truncated));
            truncated
        } else {
            text.to_string()
        };

        let mut prompt = AIPrompt::new(&self.system_prompt);
        prompt.add_task_prompt(&self.extraction_task(title, source, &text));
        invoke_structured(self.llm.as_ref(), prompt.to_messages()).await
    }

    fn extraction_task(&self, title: &str, source: &str, text: &str) -> String {
        let s = &self.settings;
        format!(
            "Analyze the following news article and extract the requested information.

GUIDELINES:
1. Summary should be a concise, headline-style, a news brief tone, between {} and {} words.
2. Begin the summary directly with the subject or action (e.g., \"AI startup Abridge has...\"), without using meta phrases like \"This article reports...\" or \"According to the article.\"
3. Short summary should be 1-2 sentences highlighting the key point of the article to attract user interest at a glance.
4. Keywords should be a list of {}-{} relevant keywords/tags for the article.
5. Author should be the name of the author if mentioned in the text, otherwise None.

IMPORTANT:
If the provided article content is not sufficient to provide a summary due to subscription barrier, login required, cut off or insufficient length of content, or similar access restrictions, then
1. Set is_content_sufficient to false.
2. Provide a reasoning on why the article content is not sufficient for the is_content_sufficient_reasoning field.
3. Leave the other fields empty.

News Article:
- Title: {}
- Source: {}
- Content: {}
",
            s.summary_min_words, s.summary_max_words, s.keywords_min_count, s.keywords_max_count, title, source, text
        )
    }
}

#[async_trait]
impl ArticleReader for NewsArticleReader {
    async fn read_article(&self, article: NewsArticle) -> Result<NewsArticle, ReaderError> {
        let html = self
            .download(&article.url)
            .await
            .map_err(|e| ReaderError::ArticleNotAccessible(format!("Article unable to download: {}", e)))?;
        self.hydrate(article, html).await
    }
}
