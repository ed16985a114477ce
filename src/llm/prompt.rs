use log::warn;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

use super::Message;

const EDITOR_PERSONA: &str = "You are an editor delivering up-to-date news article coverage feeds and their summaries based on user queries.

Your primary responsibilities include:
1. Analyzing and curating relevant news articles based on user interests and queries
2. Providing concise, accurate summaries of news articles
3. Maintaining objectivity and factual accuracy in all content
4. Identifying key themes, trends, and important developments across multiple sources
";

fn encoding() -> Option<&'static CoreBPE> {
    static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();
    BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            warn!("Failed to load cl100k_base encoding, estimating tokens instead: {}", e);
            None
        }
    })
    .as_ref()
}

/// Number of GPT-4 (`cl100k_base`) tokens in `text`
pub fn count_tokens(text: &str) -> usize {
    match encoding() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.chars().count().div_ceil(4),
    }
}

/// The editor persona shared by every news task
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    prompt: String,
}

impl SystemPrompt {
    pub fn new(additional_instructions: Option<&str>) -> Self {
        let mut prompt = EDITOR_PERSONA.to_string();
        if let Some(extra) = additional_instructions {
            prompt.push_str("\n\nAdditional Instructions:\n");
            prompt.push_str(extra);
        }
        Self { prompt }
    }

    pub fn get_prompt(&self) -> &str {
        &self.prompt
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMessageType {
    Init,
    Task,
}

#[derive(Debug, Clone)]
pub struct PromptMessage {
    pub message: String,
    pub message_type: PromptMessageType,
    pub tokens: usize,
}

/// A stack of prompt messages, starting with the system prompt
#[derive(Debug, Clone)]
pub struct AIPrompt {
    messages: Vec<PromptMessage>,
}

impl AIPrompt {
    pub fn new(system_prompt: &SystemPrompt) -> Self {
        let mut prompt = Self { messages: Vec::new() };
        prompt.add_message(system_prompt.get_prompt().to_string(), PromptMessageType::Init);
        prompt
    }

    fn add_message(&mut self, message: String, message_type: PromptMessageType) -> usize {
        let tokens = count_tokens(&message);
        self.messages.push(PromptMessage { message, message_type, tokens });
        tokens
    }

    /// Adds a task and returns its token estimate
    pub fn add_task_prompt(&mut self, task: &str) -> usize {
        let formatted = format!("<Your current task>\n{}\n</Your current task>", task);
        self.add_message(formatted, PromptMessageType::Task)
    }

    pub fn total_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.tokens).sum()
    }

    /// The whole prompt as one text block
    pub fn get_prompt(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Init messages become system messages, tasks become user messages
    pub fn to_messages(&self) -> Vec<Message> {
        self.messages
            .iter()
            .map(|m| match m.message_type {
                PromptMessageType::Init => Message::system(m.message.clone()),
                PromptMessageType::Task => Message::user(m.message.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;

    #[test]
    fn test_count_tokens_uses_cl100k() {
        assert_eq!(count_tokens(""), 0);
        assert_eq!(count_tokens("hello world"), 2);
        assert_eq!(count_tokens(&" word".repeat(50)), 50);
    }

    #[test]
    fn test_system_prompt_additional_instructions() {
        let prompt = SystemPrompt::new(Some("Answer in French."));
        assert!(prompt.get_prompt().starts_with("You are an editor"));
        assert!(prompt.get_prompt().ends_with("Additional Instructions:\nAnswer in French."));
    }

    #[test]
    fn test_task_prompt_is_wrapped() {
        let mut prompt = AIPrompt::new(&SystemPrompt::default());

        prompt.add_task_prompt("Summarize this.");

        let messages = prompt.to_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].content, "<Your current task>\nSummarize this.\n</Your current task>");
        assert!(prompt.get_prompt().contains("</Your current task>"));
        assert!(prompt.total_tokens() > 0);
    }
}
