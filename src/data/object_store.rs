use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use log::debug;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, ConfigError};

const MAX_FILENAME_LENGTH: usize = 200;

/// Where stored content comes from, written into the stored file's header
#[derive(Debug, Clone, Default)]
pub struct ContentMetadata {
    pub article_url: Option<String>,
}

impl ContentMetadata {
    pub fn for_article(url: impl Into<String>) -> Self {
        Self { article_url: Some(url.into()) }
    }
}

/// Storage backend for article HTML, Markdown and curation JSON
#[async_trait]
pub trait ObjectStoreBackend: Send + Sync {
    /// Saves content at `path` (relative to the backend root) and returns the stored key
    async fn save_content(&self, content: &str, path: &str, metadata: &ContentMetadata) -> Result<String>;

    /// Reads content by key; a missing object is `None`
    async fn read_content(&self, path: &str) -> Result<Option<String>>;
}

pub struct LocalFileSystemBackend {
    base_path: PathBuf,
}

impl LocalFileSystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }
}

#[async_trait]
impl ObjectStoreBackend for LocalFileSystemBackend {
    async fn save_content(&self, content: &str, path: &str, metadata: &ContentMetadata) -> Result<String> {
        let file_path = self.base_path.join(path);
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let body = with_metadata_header(content, path, metadata);
        tokio::fs::write(&file_path, body)
            .await
            .with_context(|| format!("Failed to write object: {}", file_path.display()))?;

        debug!("Saved object {}", file_path.display());
        Ok(path.to_string())
    }

    async fn read_content(&self, path: &str) -> Result<Option<String>> {
        let file_path = self.base_path.join(path);
        match tokio::fs::read_to_string(&file_path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read object: {}", file_path.display())),
        }
    }
}

fn with_metadata_header(content: &str, path: &str, metadata: &ContentMetadata) -> String {
    let url = metadata.article_url.as_deref().unwrap_or("");
    if path.ends_with(".html") {
        format!("<!--\nArticle URL: {}\nSaved at: {}\n-->\n{}", url, path, content)
    } else if path.ends_with(".md") {
        format!("---\narticle_url: {}\nsaved_at: {}\n---\n\n{}", url, path, content)
    } else {
        content.to_string()
    }
}

/// Object store rooted at a per-day prefix
#[derive(Clone)]
pub struct ObjectStore {
    backend: Arc<dyn ObjectStoreBackend>,
    prefix: String,
}

impl ObjectStore {
    pub fn new(backend: Arc<dyn ObjectStoreBackend>, prefix: impl Into<String>) -> Self {
        Self { backend, prefix: prefix.into() }
    }

    /// Builds the configured backend with today's date as prefix
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let backend: Arc<dyn ObjectStoreBackend> = match config.object_store_type.to_lowercase().as_str() {
            "local" => Arc::new(LocalFileSystemBackend::new(Path::new(&config.object_store_base_path))),
            other => return Err(ConfigError::UnsupportedObjectStore(other.to_string())),
        };
        Ok(Self::new(backend, Local::now().format("%Y-%m-%d").to_string()))
    }

    /// Saves HTML under `html/`; empty content is not written and yields `None`
    pub async fn save_html(&self, content: &str, filename: Option<&str>, metadata: &ContentMetadata) -> Result<Option<String>> {
        self.save("html", "html", content, filename, metadata).await
    }

    pub async fn save_markdown(&self, content: &str, filename: Option<&str>, metadata: &ContentMetadata) -> Result<Option<String>> {
        self.save("markdown", "md", content, filename, metadata).await
    }

    pub async fn save_json(&self, content: &serde_json::Value, filename: Option<&str>, metadata: &ContentMetadata) -> Result<Option<String>> {
        if content.is_null() {
            return Ok(None);
        }
        let body = serde_json::to_string(content)?;
        self.save("json", "json", &body, filename, metadata).await
    }

    pub async fn read_content(&self, path: &str) -> Result<Option<String>> {
        self.backend.read_content(path).await
    }

    async fn save(
        &self,
        folder: &str,
        extension: &str,
        content: &str,
        filename: Option<&str>,
        metadata: &ContentMetadata,
    ) -> Result<Option<String>> {
        if content.is_empty() {
            return Ok(None);
        }

        let name = match filename.map(sanitize_filename).filter(|n| !n.is_empty()) {
            Some(name) => format!("{}.{}", name, extension),
            None => content_hash_filename(content, extension),
        };

        let path = if self.prefix.is_empty() {
            format!("{}/{}", folder, name)
        } else {
            format!("{}/{}/{}", self.prefix, folder, name)
        };

        self.backend.save_content(content, &path, metadata).await.map(Some)
    }
}

/// Makes a name safe for file systems and object keys
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let truncated: String = replaced.chars().take(MAX_FILENAME_LENGTH).collect();
    truncated.trim_matches('_').to_string()
}

/// Names content by its SHA-256 digest
pub fn content_hash_filename(content: &str, extension: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{}.{}", hex::encode(digest), extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store(dir: &Path) -> ObjectStore {
        ObjectStore::new(Arc::new(LocalFileSystemBackend::new(dir)), "2025-01-02")
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Rust 1.80: what's new?"), "Rust_1.80__what's_new");
        assert_eq!(sanitize_filename("  spaced  "), "spaced");
        assert_eq!(sanitize_filename(&"a".repeat(300)).len(), 200);
    }

    #[test]
    fn test_content_hash_filename_is_stable() {
        let a = content_hash_filename("hello", "md");
        assert_eq!(a, content_hash_filename("hello", "md"));
        assert!(a.starts_with("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"));
        assert!(a.ends_with(".md"));
    }

    #[tokio::test]
    async fn test_save_html_writes_metadata_header() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let path = store
            .save_html("<p>hi</p>", Some("My Article"), &ContentMetadata::for_article("https://example.com/a"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(path, "2025-01-02/html/My_Article.html");
        let content = store.read_content(&path).await.unwrap().unwrap();
        assert!(content.starts_with("<!--\nArticle URL: https://example.com/a"));
        assert!(content.ends_with("<p>hi</p>"));
    }

    #[tokio::test]
    async fn test_save_markdown_uses_front_matter_and_hash_name() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let path = store
            .save_markdown("# Title", None, &ContentMetadata::for_article("https://example.com/b"))
            .await
            .unwrap()
            .unwrap();

        assert!(path.starts_with("2025-01-02/markdown/"));
        assert!(path.ends_with(".md"));
        let content = store.read_content(&path).await.unwrap().unwrap();
        assert!(content.starts_with("---\narticle_url: https://example.com/b\n"));
    }

    #[tokio::test]
    async fn test_empty_content_is_not_written() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        assert!(store.save_html("", Some("x"), &ContentMetadata::default()).await.unwrap().is_none());
        assert!(store.save_json(&serde_json::Value::Null, None, &ContentMetadata::default()).await.unwrap().is_none());
        assert!(!dir.path().join("2025-01-02").exists());
    }

    #[tokio::test]
    async fn test_save_json_and_read_missing() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let path = store
            .save_json(&json!({"items": []}), Some("curation"), &ContentMetadata::default())
            .await
            .unwrap()
            .unwrap();

        let raw = store.read_content(&path).await.unwrap().unwrap();
        assert_eq!(raw, r#"{"items":[]}"#);
        assert!(store.read_content("2025-01-02/json/missing.json").await.unwrap().is_none());
    }

    #[test]
    fn test_unsupported_backend_is_config_error() {
        let config = Config {
            object_store_type: "s3".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            ObjectStore::from_config(&config),
            Err(ConfigError::UnsupportedObjectStore(_))
        ));
    }
}
