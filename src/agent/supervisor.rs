use anyhow::Result;
use log::{info, warn};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

use super::notes::{extract_section, NotesFile};
use super::workers::{Worker, FINAL_SUMMARY_SECTION};
use super::AgentError;
use crate::llm::{invoke_structured, LanguageModel, Message};

pub const FINISH: &str = "FINISH";

/// Worker to route to next. If no workers needed, route to FINISH.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct Router {
    /// Name of the next worker, or FINISH
    pub next: String,
    /// What the chosen worker should do, or the closing remarks on FINISH
    pub instruction: String,
}

#[derive(Debug, Clone)]
pub struct DigestOutcome {
    /// The conversation, starting with the user's query
    pub messages: Vec<Message>,
    /// Closing remarks plus the final summary; `None` when the step limit was hit
    pub final_reply: Option<String>,
    pub steps: usize,
}

/// LLM-driven router over a team of digest workers
pub struct NewsDigestSupervisor {
    llm: Arc<dyn LanguageModel>,
    workers: Vec<Arc<dyn Worker>>,
    notes: Arc<NotesFile>,
    max_steps: usize,
}

impl NewsDigestSupervisor {
    pub fn new(llm: Arc<dyn LanguageModel>, workers: Vec<Arc<dyn Worker>>, notes: Arc<NotesFile>, max_steps: usize) -> Self {
        Self { llm, workers, notes, max_steps }
    }

    pub fn members(&self) -> Vec<&'static str> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    pub fn system_prompt(&self) -> String {
        let members = self.members();
        let sequence = members
            .iter()
            .enumerate()
            .map(|(i, m)| if i == 0 { format!("start with {}", m) } else { format!("then {}", m) })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "You are a supervisor tasked with managing a conversation between the following workers: {members}.

The team produces a tech news digest for the user's request:
- trending_news_agent collects trending tech news and saves it to the notes.
- topic_search_agent searches news about the specific tech topics the user asked for and saves them to the notes.
- summarizer_agent reads all notes and writes the final summary.

Given the conversation so far, respond with the worker to act next and a concrete instruction for it.
Each worker reports back with a [COMPLETED <worker>] message when done.
Always {sequence}, then respond FINISH. Do not call a worker that has already completed.
When responding FINISH, use the instruction for brief closing remarks to the user.

`next` must be exactly one of: {options}.",
            members = members.join(", "),
            sequence = sequence,
            options = std::iter::once(FINISH).chain(members.iter().copied()).collect::<Vec<_>>().join(", ")
        )
    }

    pub async fn run(&self, query: &str) -> Result<DigestOutcome> {
        let system_prompt = self.system_prompt();
        let mut messages = vec![Message::user(query)];

        for step in 1..=self.max_steps {
            let mut conversation = Vec::with_capacity(messages.len() + 1);
            conversation.push(Message::system(system_prompt.clone()));
            conversation.extend(messages.iter().cloned());

            let router: Router = invoke_structured(self.llm.as_ref(), conversation)
                .await
                .map_err(AgentError::from)?;
            let next = router.next.trim();
            info!("Supervisor step {}: routing to {}", step, next);

            if next == FINISH {
                let reply = format!(
                    "{}\n\n# FINAL TECH NEWS SUMMARY\n\n{}",
                    router.instruction,
                    self.final_summary()
                );
                messages.push(Message::assistant(reply.clone()));
                return Ok(DigestOutcome { messages, final_reply: Some(reply), steps: step });
            }

            let worker = self
                .workers
                .iter()
                .find(|w| w.name() == next)
                .ok_or_else(|| AgentError::UnknownMember(next.to_string()))?;

            messages.push(Message::user(format!("[INSTRUCTION FROM SUPERVISOR]\n{}", router.instruction)));
            let report = worker.run(&router.instruction).await?;
            let report = if report.trim().is_empty() { "No valid results.".to_string() } else { report };
            messages.push(Message::assistant(format!("[COMPLETED {}]\n{}", worker.name(), report)));
        }

        warn!("Supervisor stopped after {} steps without finishing", self.max_steps);
        Ok(DigestOutcome { messages, final_reply: None, steps: self.max_steps })
    }

    fn final_summary(&self) -> String {
        match self.notes.read() {
            Ok(notes) => extract_section(&notes, FINAL_SUMMARY_SECTION)
                .unwrap_or_else(|| "No final summary found in notes.".to_string()),
            Err(e) => format!("Error extracting final summary: {}", e),
        }
    }
}
