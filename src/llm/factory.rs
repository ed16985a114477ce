use anyhow::Result;
use log::info;
use std::sync::Arc;

use super::anthropic::AnthropicModel;
use super::gemini::GeminiModel;
use super::ollama::OllamaModel;
use super::openai::OpenAiModel;
use super::{LanguageModel, RateLimited, RateLimiter};
use crate::config::{Config, ConfigError};
use crate::http;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
    Ollama,
}

/// Maps a model name to its provider and the model id the provider expects
pub fn resolve_model(model_name: &str) -> Result<(Provider, String), ConfigError> {
    let name = model_name.trim();
    if let Some(local) = name.strip_prefix("ollama-") {
        return Ok((Provider::Ollama, local.to_string()));
    }
    let provider = if name.starts_with("gpt") || name.starts_with("o1") || name.starts_with("o3") {
        Provider::OpenAi
    } else if name.starts_with("claude") {
        Provider::Anthropic
    } else if name.starts_with("gemini") {
        Provider::Gemini
    } else {
        return Err(ConfigError::UnsupportedModel(name.to_string()));
    };
    Ok((provider, name.to_string()))
}

fn require_key(key: &Option<String>, name: &'static str, model: &str) -> Result<String, ConfigError> {
    key.clone().ok_or_else(|| ConfigError::MissingApiKey {
        key: name,
        model: model.to_string(),
    })
}

/// Builds the configured model, optionally wrapped in a rate limiter
pub fn get_llm(
    config: &Config,
    temperature: f32,
    rate_limiter: Option<Arc<RateLimiter>>,
) -> Result<Arc<dyn LanguageModel>> {
    let (provider, model) = resolve_model(&config.model_name)?;
    let client = http::build_client()?;

    let llm: Arc<dyn LanguageModel> = match provider {
        Provider::OpenAi => {
            let key = require_key(&config.openai_api_key, "OPENAI_API_KEY", &model)?;
            Arc::new(OpenAiModel::new(client, key, model, temperature))
        }
        Provider::Anthropic => {
            let key = require_key(&config.anthropic_api_key, "ANTHROPIC_API_KEY", &model)?;
            Arc::new(AnthropicModel::new(client, key, model, temperature))
        }
        Provider::Gemini => {
            let key = require_key(&config.gemini_api_key, "GEMINI_API_KEY", &model)?;
            Arc::new(GeminiModel::new(client, key, model, temperature))
        }
        Provider::Ollama => Arc::new(OllamaModel::new(
            client,
            config.ollama_base_url.clone(),
            model,
            temperature,
        )),
    };

    info!("Using {:?} model '{}'", provider, llm.model_name());

    Ok(match rate_limiter {
        Some(limiter) => Arc::new(RateLimited::new(llm, limiter)),
        None => llm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model_by_prefix() {
        assert_eq!(resolve_model("gpt-4o").unwrap().0, Provider::OpenAi);
        assert_eq!(resolve_model("o3-mini").unwrap().0, Provider::OpenAi);
        assert_eq!(resolve_model("claude-sonnet-4-20250514").unwrap().0, Provider::Anthropic);
        assert_eq!(resolve_model("gemini-2.5-flash").unwrap().0, Provider::Gemini);
        assert_eq!(
            resolve_model("ollama-llama3.1").unwrap(),
            (Provider::Ollama, "llama3.1".to_string())
        );
        assert!(matches!(resolve_model("mistral-large"), Err(ConfigError::UnsupportedModel(_))));
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = Config {
            model_name: "claude-sonnet-4-20250514".to_string(),
            ..Config::default()
        };

        let err = get_llm(&config, 0.0, None).err().unwrap();

        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingApiKey { key: "ANTHROPIC_API_KEY", .. })
        ));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = Config {
            model_name: "ollama-llama3".to_string(),
            ..Config::default()
        };

        let llm = get_llm(&config, 0.0, Some(Arc::new(RateLimiter::new(1.0)))).unwrap();

        assert_eq!(llm.model_name(), "llama3");
    }
}
