use anyhow::Result;
use async_trait::async_trait;
use chrono::DateTime;
use log::info;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::notes::{demote_section_headers, NotesFile};
use crate::llm::{invoke_structured, LanguageModel, Message};
use crate::models::NewsArticle;
use crate::news::NewsSource;

pub const TRENDING_NEWS_AGENT: &str = "trending_news_agent";
pub const TOPIC_SEARCH_AGENT: &str = "topic_search_agent";
pub const SUMMARIZER_AGENT: &str = "summarizer_agent";

pub const TRENDING_SECTION: &str = "Trending Tech News";
pub const TOPIC_SEARCH_SECTION: &str = "Tech Topics Search";
pub const FINAL_SUMMARY_SECTION: &str = "Final Summary";

/// A member of the digest team the supervisor can hand work to
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Carries out the supervisor's instruction and reports back
    async fn run(&self, instruction: &str) -> Result<String>;
}

/// Numbered Markdown list of articles with source, date and link
pub fn format_articles_report(title: &str, articles: &[NewsArticle], limit: usize) -> String {
    let mut report = format!("# {}\n\n", title);
    if articles.is_empty() {
        report.push_str("No articles found.\n");
        return report;
    }

    for (i, article) in articles.iter().take(limit).enumerate() {
        let published = DateTime::from_timestamp(article.published_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_default();
        report.push_str(&format!("{}. **{}**\n", i + 1, article.title));
        report.push_str(&format!("   - Source: {}\n", article.source));
        report.push_str(&format!("   - Published: {}\n", published));
        report.push_str(&format!("   - Link: [{}]({})\n\n", article.title, article.url));
    }
    report
}

pub struct TrendingNewsWorker {
    source: Arc<dyn NewsSource>,
    notes: Arc<NotesFile>,
    limit: usize,
}

impl TrendingNewsWorker {
    pub fn new(source: Arc<dyn NewsSource>, notes: Arc<NotesFile>, limit: usize) -> Self {
        Self { source, notes, limit }
    }
}

#[async_trait]
impl Worker for TrendingNewsWorker {
    fn name(&self) -> &'static str {
        TRENDING_NEWS_AGENT
    }

    async fn run(&self, _instruction: &str) -> Result<String> {
        let articles = self.source.fetch(&json!({})).await?;
        let report = format_articles_report(self.source.name(), &articles, self.limit);
        self.notes.write(TRENDING_SECTION, &report)?;

        let saved = articles.len().min(self.limit);
        info!("Saved {} trending articles from {}", saved, self.source.name());
        Ok(format!("Saved {} trending articles to notes under '{}'.", saved, TRENDING_SECTION))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TopicKeyword {
    /// Search keyword for the tech topic, e.g. "Rust" or "WebAssembly"
    keyword: String,
}

pub struct TopicSearchWorker {
    llm: Arc<dyn LanguageModel>,
    source: Arc<dyn NewsSource>,
    notes: Arc<NotesFile>,
    limit: usize,
}

impl TopicSearchWorker {
    pub fn new(llm: Arc<dyn LanguageModel>, source: Arc<dyn NewsSource>, notes: Arc<NotesFile>, limit: usize) -> Self {
        Self { llm, source, notes, limit }
    }

    async fn extract_keyword(&self, instruction: &str) -> Result<String> {
        let messages = vec![
            Message::system(
                "You are a tech topics researcher. Pick the single search keyword that best captures \
the specific tech topic (programming language, framework, product or concept) the instruction asks about.",
            ),
            Message::user(format!("Instruction: {}", instruction)),
        ];
        let topic: TopicKeyword = invoke_structured(self.llm.as_ref(), messages).await?;
        Ok(topic.keyword.trim().to_string())
    }
}

#[async_trait]
impl Worker for TopicSearchWorker {
    fn name(&self) -> &'static str {
        TOPIC_SEARCH_AGENT
    }

    async fn run(&self, instruction: &str) -> Result<String> {
        let keyword = self.extract_keyword(instruction).await?;
        info!("Searching tech topic '{}'", keyword);

        let articles = self.source.fetch(&json!({ "search_keyword": keyword })).await?;
        let report = format_articles_report(&format!("Search Results for '{}'", keyword), &articles, self.limit);
        self.notes.write(TOPIC_SEARCH_SECTION, &report)?;

        Ok(format!(
            "Saved {} articles about '{}' to notes under '{}'.",
            articles.len().min(self.limit),
            keyword,
            TOPIC_SEARCH_SECTION
        ))
    }
}

const SUMMARIZER_PROMPT: &str = "You are a tech news summarizer. Read the collected research notes and create a clear, concise summary focusing on:
- Most significant tech developments and trends
- Key insights from the research
- Why these developments matter

Your summary should be 300-500 words and include:
- A headline summary of top tech news
- Key developments in bullet points (5-8)
- Emerging trends section (2-3 paragraphs)
- Notable mentions section for interesting minor developments

Respond with the summary only, in Markdown, without a top-level heading.";

pub struct SummarizerWorker {
    llm: Arc<dyn LanguageModel>,
    notes: Arc<NotesFile>,
}

impl SummarizerWorker {
    pub fn new(llm: Arc<dyn LanguageModel>, notes: Arc<NotesFile>) -> Self {
        Self { llm, notes }
    }
}

#[async_trait]
impl Worker for SummarizerWorker {
    fn name(&self) -> &'static str {
        SUMMARIZER_AGENT
    }

    async fn run(&self, instruction: &str) -> Result<String> {
        let research = self.notes.read()?;
        let messages = vec![
            Message::system(SUMMARIZER_PROMPT),
            Message::user(format!(
                "Supervisor instruction: {}\n\nResearch notes:\n{}",
                instruction, research
            )),
        ];

        let summary = self.llm.invoke(&messages).await?;
        let summary = demote_section_headers(summary.trim());
        self.notes.write(FINAL_SUMMARY_SECTION, &summary)?;

        Ok(format!(
            "Saved a {}-word summary to notes under '{}'.",
            summary.split_whitespace().count(),
            FINAL_SUMMARY_SECTION
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::news::source::tests::StaticSource;
    use tempfile::TempDir;

    fn source() -> Arc<dyn NewsSource> {
        Arc::new(StaticSource {
            name: "Google News Technology",
            articles: vec![
                NewsArticle::new("Rust 2.0", "https://example.com/rust", 1_704_067_200, "Example"),
                NewsArticle::new("Zig 1.0", "https://example.com/zig", 1_704_067_200, "Example"),
            ],
        })
    }

    #[test]
    fn test_format_articles_report() {
        let articles = vec![NewsArticle::new("Rust 2.0", "https://example.com/rust", 1_704_067_200, "Example")];

        let report = format_articles_report("Trending", &articles, 5);

        assert_eq!(
            report,
            "# Trending\n\n1. **Rust 2.0**\n   - Source: Example\n   - Published: 2024-01-01 00:00 UTC\n   - Link: [Rust 2.0](https://example.com/rust)\n\n"
        );
        assert!(format_articles_report("Empty", &[], 5).contains("No articles found."));
    }

    #[tokio::test]
    async fn test_trending_worker_writes_limited_report() {
        let dir = TempDir::new().unwrap();
        let notes = Arc::new(NotesFile::open(dir.path()).unwrap());
        let worker = TrendingNewsWorker::new(source(), notes.clone(), 1);

        let reply = worker.run("get trending news").await.unwrap();

        assert!(reply.contains("Saved 1 trending articles"));
        let text = notes.read().unwrap();
        assert!(text.contains("## Trending Tech News"));
        assert!(text.contains("Rust 2.0"));
        assert!(!text.contains("Zig 1.0"));
    }

    #[tokio::test]
    async fn test_topic_search_worker_uses_extracted_keyword() {
        let dir = TempDir::new().unwrap();
        let notes = Arc::new(NotesFile::open(dir.path()).unwrap());
        let model = Arc::new(ScriptedModel::new([r#"{"keyword": "Rust"}"#]));
        let worker = TopicSearchWorker::new(model.clone(), source(), notes.clone(), 10);

        let reply = worker.run("Look into what is new with the Rust language").await.unwrap();

        assert!(reply.contains("about 'Rust'"));
        assert!(model.last_prompt().contains("Look into what is new with the Rust language"));
        assert!(notes.read().unwrap().contains("# Search Results for 'Rust'"));
    }

    #[tokio::test]
    async fn test_summarizer_reads_notes_and_saves_summary() {
        let dir = TempDir::new().unwrap();
        let notes = Arc::new(NotesFile::open(dir.path()).unwrap());
        notes.write(TRENDING_SECTION, "Rust 2.0 released").unwrap();
        let model = Arc::new(ScriptedModel::new(["Rust leads the week.\n## Trends\nMore Rust."]));
        let worker = SummarizerWorker::new(model.clone(), notes.clone());

        worker.run("summarize").await.unwrap();

        assert!(model.last_prompt().contains("Rust 2.0 released"));
        let saved = crate::agent::notes::extract_section(&notes.read().unwrap(), FINAL_SUMMARY_SECTION).unwrap();
        assert_eq!(saved, "Rust leads the week.\n### Trends\nMore Rust.");
    }

    #[tokio::test]
    async fn test_summarizer_keeps_summary_opening_with_header() {
        let dir = TempDir::new().unwrap();
        let notes = Arc::new(NotesFile::open(dir.path()).unwrap());
        let model = Arc::new(ScriptedModel::new(["## Headline\nRust wins.\n## Trends\nMore."]));
        let worker = SummarizerWorker::new(model, notes.clone());

        worker.run("summarize").await.unwrap();

        let saved = crate::agent::notes::extract_section(&notes.read().unwrap(), FINAL_SUMMARY_SECTION).unwrap();
        assert_eq!(saved, "### Headline\nRust wins.\n### Trends\nMore.");
    }
}
