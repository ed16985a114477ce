use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::retry::send_json_with_retry;
use super::{split_system, LanguageModel, LlmError, Message, MessageRole};

const PROVIDER: &str = "gemini";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini `generateContent` client
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GeminiModel {
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", API_BASE, self.model)
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        let (system, rest) = split_system(messages);
        let contents: Vec<Value> = rest
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::Assistant => "model",
                    _ => "user",
                };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": { "temperature": self.temperature },
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }
}

fn response_text(response: &Value) -> Option<String> {
    let parts = response["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = self.request_body(messages);
        let endpoint = self.endpoint();
        let response = send_json_with_retry(PROVIDER, || {
            self.client
                .post(&endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;

        response_text(&response).ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER,
            message: format!(
                "no candidate text (finishReason: {})",
                response["candidates"][0]["finishReason"].as_str().unwrap_or("unknown")
            ),
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
    fn test_assistant_messages_use_model_role() {
        let model = GeminiModel::new(Client::new(), "key", "gemini-2.5-flash", 0.0);

        let body = model.request_body(&[
            Message::system("sys"),
            Message::user("q"),
            Message::assistant("a"),
        ]);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(
            model.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "a" }, { "text": "b" }] } }]
        });
        assert_eq!(response_text(&response).as_deref(), Some("ab"));
        assert!(response_text(&json!({ "candidates": [] })).is_none());
    }
}
