use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::retry::send_json_with_retry;
use super::{LanguageModel, LlmError, Message};

const PROVIDER: &str = "ollama";

/// Local Ollama server, via its `/api/chat` endpoint
pub struct OllamaModel {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaModel {
    pub fn new(client: Client, base_url: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": self.temperature },
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = self.request_body(messages);
        let endpoint = self.endpoint();
        let response = send_json_with_retry(PROVIDER, || self.client.post(&endpoint).json(&body)).await?;

        response["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER,
                message: "missing message.content".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
