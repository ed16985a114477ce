use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Longest spacing between LLM requests that LLM_REQUESTS_PER_SECOND may ask for
const MAX_LLM_INTERVAL_SECS: f64 = 3600.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} must be set to use model '{model}'")]
    MissingApiKey { key: &'static str, model: String },
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("unsupported object store type: {0}")]
    UnsupportedObjectStore(String),
}

/// Runtime configuration, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,

    // LLM settings
    pub model_name: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub ollama_base_url: String,
    pub llm_requests_per_second: f64,

    // Storage
    pub database_url: String,
    pub object_store_type: String,
    pub object_store_base_path: String,

    // News collection
    pub article_collection_age_cap: String,
    pub article_registry_max_news_sources: usize,
    pub article_keywords_min_count: usize,
    pub article_keywords_max_count: usize,
    pub article_summary_min_word_count: usize,
    pub article_summary_max_word_count: usize,
    pub article_parser_content_max_token_length: usize,

    // Curation
    pub feed_min_relevance_score: f64,
    pub feed_max_articles_per_batch: usize,
    pub query_prompt_security_check: bool,

    // Supervisor
    pub supervisor_max_steps: usize,
    pub notes_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            model_name: "gemini-2.5-flash".to_string(),
            openai_api_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
            ollama_base_url: "http://localhost:11434".to_string(),
            llm_requests_per_second: 2.0,
            database_url: "data/duksu.db".to_string(),
            object_store_type: "local".to_string(),
            object_store_base_path: "storage/objects".to_string(),
            article_collection_age_cap: "30d".to_string(),
            article_registry_max_news_sources: 3,
            article_keywords_min_count: 3,
            article_keywords_max_count: 5,
            article_summary_min_word_count: 100,
            article_summary_max_word_count: 200,
            article_parser_content_max_token_length: 8000,
            feed_min_relevance_score: 0.6,
            feed_max_articles_per_batch: 10,
            query_prompt_security_check: false,
            supervisor_max_steps: 10,
            notes_dir: "tech_news_notes".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).filter(|v| !v.is_empty()).unwrap_or(default);
        let secret = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm_requests_per_second: f64 = parse_or(&lookup, "LLM_REQUESTS_PER_SECOND", defaults.llm_requests_per_second)?;
        // 0 disables rate limiting; anything else must give an interval of at most MAX_LLM_INTERVAL_SECS
        if !(llm_requests_per_second == 0.0 || llm_requests_per_second >= 1.0 / MAX_LLM_INTERVAL_SECS)
            || !llm_requests_per_second.is_finite()
        {
            return Err(ConfigError::InvalidValue {
                key: "LLM_REQUESTS_PER_SECOND",
                value: llm_requests_per_second.to_string(),
            });
        }

        Ok(Self {
            log_level: string("LOG_LEVEL", defaults.log_level),
            model_name: string("MODEL_NAME", defaults.model_name),
            openai_api_key: secret("OPENAI_API_KEY"),
            anthropic_api_key: secret("ANTHROPIC_API_KEY"),
            gemini_api_key: secret("GEMINI_API_KEY"),
            ollama_base_url: string("OLLAMA_BASE_URL", defaults.ollama_base_url),
            llm_requests_per_second,
            database_url: string("DATABASE_URL", defaults.database_url),
            object_store_type: string("OBJECT_STORE_TYPE", defaults.object_store_type),
            object_store_base_path: string("OBJECT_STORE_BASE_PATH", defaults.object_store_base_path),
            article_collection_age_cap: lookup("ARTICLE_COLLECTION_AGE_CAP").unwrap_or(defaults.article_collection_age_cap),
            article_registry_max_news_sources: parse_or(&lookup, "ARTICLE_REGISTRY_MAX_NEWS_SOURCES", defaults.article_registry_max_news_sources)?,
            article_keywords_min_count: parse_or(&lookup, "ARTICLE_KEYWORDS_MIN_COUNT", defaults.article_keywords_min_count)?,
            article_keywords_max_count: parse_or(&lookup, "ARTICLE_KEYWORDS_MAX_COUNT", defaults.article_keywords_max_count)?,
            article_summary_min_word_count: parse_or(&lookup, "ARTICLE_SUMMARY_MIN_WORD_COUNT", defaults.article_summary_min_word_count)?,
            article_summary_max_word_count: parse_or(&lookup, "ARTICLE_SUMMARY_MAX_WORD_COUNT", defaults.article_summary_max_word_count)?,
            article_parser_content_max_token_length: parse_or(&lookup, "ARTICLE_PARSER_CONTENT_MAX_TOKEN_LENGTH", defaults.article_parser_content_max_token_length)?,
            feed_min_relevance_score: parse_or(&lookup, "FEED_MIN_RELEVANCE_SCORE", defaults.feed_min_relevance_score)?,
            feed_max_articles_per_batch: parse_or(&lookup, "FEED_MAX_ARTICLES_PER_BATCH", defaults.feed_max_articles_per_batch)?,
            query_prompt_security_check: parse_bool_or(&lookup, "QUERY_PROMPT_SECURITY_CHECK", defaults.query_prompt_security_check)?,
            supervisor_max_steps: parse_or(&lookup, "SUPERVISOR_MAX_STEPS", defaults.supervisor_max_steps)?,
            notes_dir: string("NOTES_DIR", defaults.notes_dir),
        })
    }

    /// Filesystem path of the SQLite database, accepting either a bare path or a `sqlite://` URL.
    pub fn database_path(&self) -> PathBuf {
        let url = self.database_url.as_str();
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        PathBuf::from(path)
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        _ => Ok(default),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            "" => Ok(default),
            _ => Err(ConfigError::InvalidValue { key, value }),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.article_registry_max_news_sources, 3);
        assert_eq!(config.article_collection_age_cap, "30d");
        assert!(config.openai_api_key.is_none());
        assert!(!config.query_prompt_security_check);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("MODEL_NAME", "gpt-4o"),
            ("OPENAI_API_KEY", "sk-test"),
            ("ARTICLE_KEYWORDS_MAX_COUNT", "7"),
            ("FEED_MIN_RELEVANCE_SCORE", "0.75"),
            ("QUERY_PROMPT_SECURITY_CHECK", "yes"),
        ])
        .unwrap();

        assert_eq!(config.model_name, "gpt-4o");
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.article_keywords_max_count, 7);
        assert_eq!(config.feed_min_relevance_score, 0.75);
        assert!(config.query_prompt_security_check);
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let err = config_from(&[("ARTICLE_REGISTRY_MAX_NEWS_SOURCES", "three")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "ARTICLE_REGISTRY_MAX_NEWS_SOURCES", .. }));
    }

    #[test]
    fn test_requests_per_second_range() {
        for bad in ["1e-300", "-1", "NaN", "inf"] {
            let err = config_from(&[("LLM_REQUESTS_PER_SECOND", bad)]).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { key: "LLM_REQUESTS_PER_SECOND", .. }), "{}", bad);
        }

        assert_eq!(config_from(&[("LLM_REQUESTS_PER_SECOND", "0")]).unwrap().llm_requests_per_second, 0.0);
        assert_eq!(config_from(&[("LLM_REQUESTS_PER_SECOND", "0.5")]).unwrap().llm_requests_per_second, 0.5);
    }

    #[test]
    fn test_database_path_accepts_sqlite_urls() {
        let config = config_from(&[("DATABASE_URL", "sqlite://var/duksu.db")]).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("var/duksu.db"));

        let config = config_from(&[("DATABASE_URL", "local.db")]).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("local.db"));
    }
}
