pub mod anthropic;
pub mod factory;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod prompt;
pub mod rate_limiter;
mod retry;
pub mod structured;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use factory::get_llm;
pub use prompt::{count_tokens, AIPrompt, SystemPrompt};
pub use rate_limiter::{RateLimited, RateLimiter};
pub use structured::invoke_structured;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{provider} request failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} returned an unexpected response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },
    #[error("could not parse structured output: {0}")]
    StructuredOutput(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// A chat model that turns a conversation into a single text reply
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}

/// Splits system messages from the conversation, for APIs that take the system prompt separately
pub(crate) fn split_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .collect();
    let rest = messages.iter().filter(|m| m.role != MessageRole::System).collect();
    let system = if system.is_empty() { None } else { Some(system.join("\n\n")) };
    (system, rest)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies with canned responses in order and records every conversation it sees
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        pub calls: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn last_prompt(&self) -> String {
            self.calls
                .lock()
                .unwrap()
                .last()
                .map(|messages| {
                    messages
                        .iter()
                        .map(|m| m.content.as_str())
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::InvalidResponse {
                    provider: "scripted",
                    message: "no scripted reply left".to_string(),
                })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }
}
