use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{LanguageModel, LlmError, Message};

/// Instructions appended to a prompt so the model answers with JSON matching `T`
pub fn format_instructions<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    let schema = serde_json::to_string_pretty(&schema).unwrap_or_default();
    format!(
        "\n\nRespond only with a JSON object that conforms to the JSON schema below. \
Do not include any text outside the JSON.\n```json\n{}\n```",
        schema
    )
}

/// Every JSON object or array in a reply, in order, skipping code fences and prose
fn json_candidates(text: &str) -> impl Iterator<Item = Value> + '_ {
    let mut search = text;
    std::iter::from_fn(move || {
        while let Some(offset) = search.find(['{', '[']) {
            let candidate = &search[offset..];
            let mut values = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
            if let Some(Ok(value)) = values.next() {
                search = &candidate[values.byte_offset()..];
                return Some(value);
            }
            search = &candidate[1..];
        }
        None
    })
}

/// Finds the first JSON object or array in a reply
pub fn extract_json(text: &str) -> Option<Value> {
    json_candidates(text).next()
}

/// Parses the first JSON value in `reply` that deserializes into `T`
pub fn parse_structured<T: DeserializeOwned>(reply: &str) -> Result<T, LlmError> {
    let mut last_error = None;
    for value in json_candidates(reply) {
        match serde_json::from_value(value) {
            Ok(parsed) => return Ok(parsed),
            Err(e) => last_error = Some(e),
        }
    }
    Err(match last_error {
        Some(e) => LlmError::StructuredOutput(e.to_string()),
        None => LlmError::StructuredOutput(format!("no JSON found in reply: {}", truncate(reply))),
    })
}

/// Invokes the model and parses its reply into `T`
pub async fn invoke_structured<T>(model: &dyn LanguageModel, messages: Vec<Message>) -> Result<T, LlmError>
where
    T: JsonSchema + DeserializeOwned,
{
    let mut messages = messages;
    let instructions = format_instructions::<T>();
    match messages.last_mut() {
        Some(last) => last.content.push_str(&instructions),
        None => messages.push(Message::user(instructions)),
    }

    let reply = model.invoke(&messages).await?;
    parse_structured(&reply)
}

fn truncate(text: &str) -> String {
    text.chars().take(200).collect()
}
