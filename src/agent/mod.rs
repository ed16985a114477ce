pub mod notes;
pub mod security;
pub mod supervisor;
pub mod workers;

use thiserror::Error;

use crate::llm::LlmError;

pub use notes::NotesFile;
pub use security::{ObjectiveAlignment, SecurePromptAgent, SecurityAnalysis};
pub use supervisor::{DigestOutcome, NewsDigestSupervisor, Router};
pub use workers::{SummarizerWorker, TopicSearchWorker, TrendingNewsWorker, Worker};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to analyze prompt: {0}")]
    SecurityAnalysisFailed(String),
    #[error("supervisor routed to unknown worker '{0}'")]
    UnknownMember(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
}
