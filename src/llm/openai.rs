use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::retry::send_json_with_retry;
use super::{LanguageModel, LlmError, Message};

const PROVIDER: &str = "openai";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat completions client
pub struct OpenAiModel {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiModel {
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        }
    }

    fn request_body(&self, messages: &[Message]) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        // Reasoning models only accept the default temperature
        if !is_reasoning_model(&self.model) {
            body["temperature"] = json!(self.temperature);
        }
        body
    }
}

fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1") || model.starts_with("o3")
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = self.request_body(messages);
        let response = send_json_with_retry(PROVIDER, || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        response["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER,
                message: "missing choices[0].message.content".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_serializes_roles() {
        let model = OpenAiModel::new(Client::new(), "sk", "gpt-4o", 0.2);

        let body = model.request_body(&[Message::system("sys"), Message::user("hi")]);

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("temperature").is_some());
    }

    #[test]
    fn test_reasoning_models_omit_temperature() {
        let model = OpenAiModel::new(Client::new(), "sk", "o3-mini", 0.2);
        let body = model.request_body(&[Message::user("hi")]);
        assert!(body.get("temperature").is_none());
    }
}
