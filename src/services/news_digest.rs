use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::agent::{
    NewsDigestSupervisor, NotesFile, SummarizerWorker, TopicSearchWorker, TrendingNewsWorker, Worker,
};
use crate::llm::LanguageModel;
use crate::news::NewsSource;

const ARTICLES_PER_REPORT: usize = 10;

/// Outcome of a digest run
#[derive(Debug, Clone, Serialize)]
pub struct NewsDigestResult {
    pub query: String,

    /// The supervisor's final reply, including the summary from the notes
    pub final_summary: Option<String>,

    /// Number of routing steps taken
    pub steps: usize,

    /// Where the research notes were written
    pub notes_path: String,

    pub error_message: Option<String>,
}

/// Runs the supervisor and its three workers over a shared notes file
pub struct NewsDigestService {
    supervisor: NewsDigestSupervisor,
    notes: Arc<NotesFile>,
    max_steps: usize,
}

impl NewsDigestService {
    /// `trending` feeds the trending worker and `search` takes a `search_keyword` parameter
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        trending: Arc<dyn NewsSource>,
        search: Arc<dyn NewsSource>,
        notes: Arc<NotesFile>,
        max_steps: usize,
    ) -> Self {
        let workers: Vec<Arc<dyn Worker>> = vec![
            Arc::new(TrendingNewsWorker::new(trending, notes.clone(), ARTICLES_PER_REPORT)),
            Arc::new(TopicSearchWorker::new(llm.clone(), search, notes.clone(), ARTICLES_PER_REPORT)),
            Arc::new(SummarizerWorker::new(llm.clone(), notes.clone())),
        ];
        Self {
            supervisor: NewsDigestSupervisor::new(llm, workers, notes.clone(), max_steps),
            notes,
            max_steps,
        }
    }

    /// Lets the supervisor route between the workers until it finishes or runs out of steps
    pub async fn run(&self, query: &str) -> Result<NewsDigestResult> {
        let outcome = self.supervisor.run(query).await?;
        let error_message = match outcome.final_reply {
            Some(_) => None,
            None => Some(format!("Supervisor did not finish within {} steps", self.max_steps)),
        };

        Ok(NewsDigestResult {
            query: query.to_string(),
            final_summary: outcome.final_reply,
            steps: outcome.steps,
            notes_path: self.notes.path().display().to_string(),
            error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::models::NewsArticle;
    use crate::news::source::tests::StaticSource;
    use tempfile::TempDir;

    fn source(name: &'static str) -> Arc<dyn NewsSource> {
        Arc::new(StaticSource {
            name,
            articles: vec![NewsArticle::new("Rust 2.0", "https://example.com/rust", 1_704_067_200, "Example")],
        })
    }

    #[tokio::test]
    async fn test_digest_end_to_end() {
        let dir = TempDir::new().unwrap();
        let notes = Arc::new(NotesFile::open(dir.path()).unwrap());
        let model = Arc::new(ScriptedModel::new([
            r#"{"next": "trending_news_agent", "instruction": "get trending tech news"}"#,
            r#"{"next": "topic_search_agent", "instruction": "search Rust"}"#,
            r#"{"keyword": "Rust"}"#,
            r#"{"next": "summarizer_agent", "instruction": "summarize everything"}"#,
            "Rust dominates this week's news.",
            r#"{"next": "FINISH", "instruction": "Done."}"#,
        ]));
        let service = NewsDigestService::new(model, source("Google News Technology"), source("Google News Search"), notes, 10);

        let result = service.run("What is new in Rust?").await.unwrap();

        assert!(result.error_message.is_none());
        assert_eq!(result.steps, 4);
        assert_eq!(
            result.final_summary.as_deref(),
            Some("Done.\n\n# FINAL TECH NEWS SUMMARY\n\nRust dominates this week's news.")
        );
        assert!(result.notes_path.ends_with("tech_news_notes.md"));
    }

    #[tokio::test]
    async fn test_unfinished_digest_reports_error() {
        let dir = TempDir::new().unwrap();
        let notes = Arc::new(NotesFile::open(dir.path()).unwrap());
        let model = Arc::new(ScriptedModel::new([
            r#"{"next": "trending_news_agent", "instruction": "again"}"#,
        ]));
        let service = NewsDigestService::new(model, source("a"), source("b"), notes, 1);

        let result = service.run("hi").await.unwrap();

        assert_eq!(result.error_message.as_deref(), Some("Supervisor did not finish within 1 steps"));
        assert!(result.final_summary.is_none());
    }
}
