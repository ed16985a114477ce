use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::retry::send_json_with_retry;
use super::{split_system, LanguageModel, LlmError, Message};

const PROVIDER: &str = "anthropic";
const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Anthropic messages API client
pub struct AnthropicModel {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl AnthropicModel {
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        }
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        let (system, rest) = split_system(messages);
        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": self.temperature,
            "messages": rest,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        body
    }
}

fn response_text(response: &Value) -> Option<String> {
    let blocks = response["content"].as_array()?;
    let text: Vec<&str> = blocks
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.join(""))
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = self.request_body(messages);
        let response = send_json_with_retry(PROVIDER, || {
            self.client
                .post(&self.endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
        })
        .await?;

        response_text(&response).ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER,
            message: "no text content blocks".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
