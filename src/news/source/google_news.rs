use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{error, info, warn};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::decoder::GoogleNewsDecoder;
use super::{NewsSource, NewsSourceRegistry, ParamSpec};
use crate::models::NewsArticle;
use crate::news::time::convert_date_str_to_timestamp;

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const RSS_BASE_URL: &str = "https://news.google.com/rss";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    World,
    Business,
    Technology,
    Entertainment,
    Sports,
    Science,
    Health,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Topic::World,
        Topic::Business,
        Topic::Technology,
        Topic::Entertainment,
        Topic::Sports,
        Topic::Science,
        Topic::Health,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Topic::World => "CAAqJggKIiBDQkFTRWdvSUwyMHZNRGx1YlY4U0FtVnVHZ0pKVGlnQVAB",
            Topic::Business => "CAAqJggKIiBDQkFTRWdvSUwyMHZNRGx6TVdZU0FtVnVHZ0pKVGlnQVAB",
            Topic::Technology => "CAAqJggKIiBDQkFTRWdvSUwyMHZNRFp1ZEdvU0FtVnVHZ0pKVGlnQVAB",
            Topic::Entertainment => "CAAqJggKIiBDQkFTRWdvSUwyMHZNREpxYW5RU0FtVnVHZ0pKVGlnQVAB",
            Topic::Sports => "CAAqJggKIiBDQkFTRWdvSUwyMHZNRFp1ZEdvU0FtVnVHZ0pKVGlnQVAB",
            Topic::Science => "CAAqJggKIiBDQkFTRWdvSUwyMHZNRFp0Y1RjU0FtVnVHZ0pKVGlnQVAB",
            Topic::Health => "CAAqIQgKIhtDQkFTRGdvSUwyMHZNR3QwTlRFU0FtVnVLQUFQAQ",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Topic::World => "World",
            Topic::Business => "Business",
            Topic::Technology => "Technology",
            Topic::Entertainment => "Entertainment",
            Topic::Sports => "Sports",
            Topic::Science => "Science",
            Topic::Health => "Health",
        }
    }

    pub fn from_str(topic: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(topic.trim()))
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_country() -> String {
    "US".to_string()
}

/// Localization for Google News feeds
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GoogleNewsParam {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_country")]
    pub country: String,
}

impl Default for GoogleNewsParam {
    fn default() -> Self {
        Self {
            language: default_language(),
            country: default_country(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GoogleNewsSearchParam {
    pub search_keyword: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn locale_params(language: &str, country: &str) -> Vec<(&'static str, String)> {
    vec![
        ("hl", format!("{}-{}", language, country)),
        ("gl", country.to_string()),
        ("ceid", format!("{}:{}", country, language)),
    ]
}

pub fn top_stories_url(param: &GoogleNewsParam) -> Result<Url> {
    Ok(Url::parse_with_params(RSS_BASE_URL, locale_params(&param.language, &param.country))?)
}

pub fn topic_url(topic: Topic, param: &GoogleNewsParam) -> Result<Url> {
    Ok(Url::parse_with_params(
        &format!("{}/topics/{}", RSS_BASE_URL, topic.id()),
        locale_params(&param.language, &param.country),
    )?)
}

pub fn search_url(param: &GoogleNewsSearchParam) -> Result<Url> {
    let mut params = vec![("q", param.search_keyword.clone())];
    params.extend(locale_params(&param.language, &param.country));
    Ok(Url::parse_with_params(&format!("{}/search", RSS_BASE_URL), params)?)
}

/// Removes the vendor suffix (" - Vendor") from a title, unless nothing would be left
pub fn clean_article_title(title: &str) -> String {
    if let Some(index) = title.rfind(" - ") {
        let cleaned = title[..index].trim();
        if !cleaned.is_empty() {
            return cleaned.to_string();
        }
    }
    title.to_string()
}

/// One `<item>` of a Google News feed before its link is decoded
#[derive(Debug, Clone, PartialEq)]
pub struct RssEntry {
    pub title: String,
    pub link: String,
    pub source: String,
    pub published_at: i64,
}

#[derive(Debug, Default)]
struct ItemExtras {
    source: String,
    pub_date: String,
}

/// `<source>` names and raw `pubDate`s keyed by item link
fn read_item_extras(xml: &str) -> Result<HashMap<String, ItemExtras>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut extras = HashMap::new();
    let mut in_item = false;
    let mut current_tag = Vec::new();
    let mut link = String::new();
    let mut item = ItemExtras::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                if name == b"item" {
                    in_item = true;
                    link.clear();
                    item = ItemExtras::default();
                }
                current_tag = name;
            }
            Event::Text(t) if in_item => {
                let text = t.unescape()?.into_owned();
                match current_tag.as_slice() {
                    b"link" => link.push_str(&text),
                    b"source" => item.source.push_str(&text),
                    b"pubDate" => item.pub_date.push_str(&text),
                    _ => {}
                }
            }
            Event::CData(t) if in_item && current_tag.as_slice() == b"source" => {
                item.source.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Event::End(e) => {
                if e.name().as_ref() == b"item" {
                    in_item = false;
                    extras.insert(std::mem::take(&mut link), std::mem::take(&mut item));
                }
                current_tag.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(extras)
}

/// Parses a Google News RSS document into entries
pub fn parse_rss_entries(xml: &str) -> Result<Vec<RssEntry>> {
    let feed = feed_rs::parser::parse(xml.as_bytes()).map_err(|e| anyhow!("Failed to parse RSS feed: {}", e))?;
    let extras = read_item_extras(xml)?;

    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone())?;
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());
            let extra = extras.get(&link);
            let published_at = match entry.published {
                Some(dt) => dt.timestamp(),
                None => convert_date_str_to_timestamp(extra.map(|e| e.pub_date.as_str()).unwrap_or("")),
            };
            Some(RssEntry {
                title,
                link,
                source: extra.map(|e| e.source.clone()).unwrap_or_default(),
                published_at,
            })
        })
        .collect();

    Ok(entries)
}

/// Downloads Google News feeds and resolves their links to publisher URLs
pub struct GoogleNewsFetcher {
    client: Client,
    decoder: GoogleNewsDecoder,
}

impl GoogleNewsFetcher {
    pub fn new(client: Client) -> Result<Self> {
        let decoder = GoogleNewsDecoder::new(client.clone(), Duration::from_secs(1))?;
        Ok(Self { client, decoder })
    }

    /// Fetches a feed. HTTP and parse failures are logged and yield no articles.
    pub async fn fetch_rss(&self, url: &Url) -> Vec<NewsArticle> {
        let body = match self.download(url).await {
            Ok(body) => body,
            Err(e) => {
                error!("Error collecting from {}: {}", url, e);
                return Vec::new();
            }
        };

        let entries = match parse_rss_entries(&body) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Error collecting from {}: {}", url, e);
                return Vec::new();
            }
        };

        if entries.is_empty() {
            warn!("No entries found in RSS feed for {}", url);
            return Vec::new();
        }

        let mut articles = Vec::with_capacity(entries.len());
        for entry in entries {
            let article_url = match self.decoder.decode(&entry.link).await {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("Skipping entry '{}' - failed to decode Google News URL: {}", entry.title, e);
                    continue;
                }
            };
            articles.push(NewsArticle::new(
                clean_article_title(&entry.title),
                article_url,
                entry.published_at,
                entry.source,
            ));
        }

        info!("Successfully fetched {} articles from news source url: {}", articles.len(), url);
        articles
    }

    async fn download(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP {}", response.status()));
        }
        Ok(response.text().await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoogleNewsKind {
    TopStories,
    Topic(Topic),
    Search,
}

pub struct GoogleNewsSource {
    kind: GoogleNewsKind,
    name: String,
    description: String,
    fetcher: Arc<GoogleNewsFetcher>,
}

impl GoogleNewsSource {
    pub fn new(kind: GoogleNewsKind, fetcher: Arc<GoogleNewsFetcher>) -> Self {
        let (name, description) = match kind {
            GoogleNewsKind::TopStories => (
                "Google News Top Stories".to_string(),
                "General top headlines from Google News with country and language localization".to_string(),
            ),
            GoogleNewsKind::Topic(topic) => (
                format!("Google News {}", topic.label()),
                format!(
                    "{} news from Google News with optional language and country customization",
                    if topic == Topic::World { "Worldwide" } else { topic.label() }
                ),
            ),
            GoogleNewsKind::Search => (
                "Google News Search".to_string(),
                "Custom keyword search from Google News, useful to answer if user query is specific and not fully covered by other general sources".to_string(),
            ),
        };
        Self { kind, name, description, fetcher }
    }

    /// The feed URL for the given parameters; invalid parameters are an error
    pub fn feed_url(&self, params: &Value) -> Result<Url> {
        let params = if params.is_null() { Value::Object(Default::default()) } else { params.clone() };
        match self.kind {
            GoogleNewsKind::TopStories => top_stories_url(&serde_json::from_value(params)?),
            GoogleNewsKind::Topic(topic) => topic_url(topic, &serde_json::from_value(params)?),
            GoogleNewsKind::Search => search_url(&serde_json::from_value(params)?),
        }
    }
}

#[async_trait]
impl NewsSource for GoogleNewsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        let mut specs = Vec::new();
        if self.kind == GoogleNewsKind::Search {
            specs.push(ParamSpec {
                name: "search_keyword",
                type_name: "str",
                description: "Search keyword for news articles",
                default: None,
            });
        }
        specs.push(ParamSpec {
            name: "language",
            type_name: "str",
            description: "Language code for news (e.g., 'en', 'es', 'fr', 'de', 'it', 'ja', 'ko', 'zh')",
            default: Some("en"),
        });
        specs.push(ParamSpec {
            name: "country",
            type_name: "str",
            description: "Country code for news (e.g., 'US', 'GB', 'FR', 'DE', 'IT', 'JP', 'KR', 'CN')",
            default: Some("US"),
        });
        specs
    }

    async fn fetch(&self, params: &Value) -> Result<Vec<NewsArticle>> {
        let url = self.feed_url(params)?;
        info!("Fetching {} from {}", self.name, url);
        Ok(self.fetcher.fetch_rss(&url).await)
    }
}

/// Registers top stories, every topic, and search
pub fn register_google_news_sources(registry: &mut NewsSourceRegistry, fetcher: Arc<GoogleNewsFetcher>) {
    registry.register(Arc::new(GoogleNewsSource::new(GoogleNewsKind::TopStories, fetcher.clone())));
    for topic in Topic::ALL {
        registry.register(Arc::new(GoogleNewsSource::new(GoogleNewsKind::Topic(topic), fetcher.clone())));
    }
    registry.register(Arc::new(GoogleNewsSource::new(GoogleNewsKind::Search, fetcher)));
}
