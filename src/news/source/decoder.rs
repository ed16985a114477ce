use anyhow::{anyhow, bail, Context, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use log::debug;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::google_news::BROWSER_USER_AGENT;

const BATCH_EXECUTE_URL: &str = "https://news.google.com/_/DotsSplashUi/data/batchexecute";

const LEGACY_PREFIX: &[u8] = &[0x08, 0x13, 0x22];
const LEGACY_SUFFIX: &[u8] = &[0xd2, 0x01, 0x00];

// Article ids are unpadded and sometimes carry trailing bits
const ARTICLE_ID_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Resolves Google News redirect links (`news.google.com/rss/articles/<id>`) to publisher URLs
pub struct GoogleNewsDecoder {
    client: Client,
    interval: Duration,
    signature_re: Regex,
    timestamp_re: Regex,
}

impl GoogleNewsDecoder {
    /// `interval` is waited after every network decode
    pub fn new(client: Client, interval: Duration) -> Result<Self> {
        Ok(Self {
            client,
            interval,
            signature_re: Regex::new(r#"data-n-a-sg="([^"]+)""#)?,
            timestamp_re: Regex::new(r#"data-n-a-ts="([^"]+)""#)?,
        })
    }

    pub async fn decode(&self, google_url: &str) -> Result<String> {
        let article_id = extract_article_id(google_url)?;

        if let Some(url) = decode_legacy_id(&article_id) {
            return Ok(url);
        }

        let result = self.decode_with_batch_execute(&article_id).await;
        tokio::time::sleep(self.interval).await;
        result
    }

    async fn decode_with_batch_execute(&self, article_id: &str) -> Result<String> {
        let (signature, timestamp) = self.fetch_decoding_params(article_id).await?;

        let payload = build_batch_execute_payload(article_id, &timestamp, &signature);
        let response = self
            .client
            .post(BATCH_EXECUTE_URL)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .form(&[("f.req", payload)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_batch_execute_response(&response)
    }

    /// Reads the signature and timestamp embedded in the article page
    async fn fetch_decoding_params(&self, article_id: &str) -> Result<(String, String)> {
        let mut last_error = None;
        for base in ["https://news.google.com/articles", "https://news.google.com/rss/articles"] {
            let url = format!("{}/{}", base, article_id);
            let page = match self
                .client
                .get(&url)
                .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                Ok(response) => response.text().await?,
                Err(e) => {
                    debug!("Failed to fetch {}: {}", url, e);
                    last_error = Some(e);
                    continue;
                }
            };

            let signature = self.signature_re.captures(&page).map(|c| c[1].to_string());
            let timestamp = self.timestamp_re.captures(&page).map(|c| c[1].to_string());
            if let (Some(signature), Some(timestamp)) = (signature, timestamp) {
                return Ok((signature, timestamp));
            }
        }

        match last_error {
            Some(e) => Err(e).context("Failed to fetch decoding parameters"),
            None => bail!("Decoding parameters not found for article {}", article_id),
        }
    }
}

/// The id segment following `articles` or `read` in a Google News link
pub fn extract_article_id(google_url: &str) -> Result<String> {
    let url = Url::parse(google_url).with_context(|| format!("Invalid URL: {}", google_url))?;
    if url.host_str() != Some("news.google.com") {
        bail!("Not a Google News URL: {}", google_url);
    }

    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    segments
        .windows(2)
        .find(|pair| pair[0] == "articles" || pair[0] == "read")
        .map(|pair| pair[1].to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("No article id in Google News URL: {}", google_url))
}

/// Older ids embed the publisher URL directly in a length-prefixed protobuf field
pub fn decode_legacy_id(article_id: &str) -> Option<String> {
    let bytes = ARTICLE_ID_ENGINE.decode(article_id.trim_end_matches('=')).ok()?;
    let mut body = bytes.strip_prefix(LEGACY_PREFIX)?;
    if let Some(stripped) = body.strip_suffix(LEGACY_SUFFIX) {
        body = stripped;
    }

    let (length, header) = read_varint(body)?;
    let end = header.checked_add(length)?;
    let url = std::str::from_utf8(body.get(header..end)?).ok()?;

    if url.starts_with("AU_yqL") || !url.starts_with("http") {
        return None;
    }
    Some(url.to_string())
}

/// Returns (value, bytes consumed)
fn read_varint(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut value = 0usize;
    for (i, byte) in bytes.iter().enumerate().take(4) {
        value |= ((byte & 0x7f) as usize) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

pub fn build_batch_execute_payload(article_id: &str, timestamp: &str, signature: &str) -> String {
    let inner = format!(
        r#"["garturlreq",[["X","X",["X","X"],null,null,1,1,"US:en",null,1,null,null,null,null,null,0,1],"X","X",1,[1,1,1],1,1,null,0,0,null,0],"{}",{},"{}"]"#,
        article_id, timestamp, signature
    );
    let request = serde_json::json!([[["Fbv4je", inner, null, "generic"]]]);
    request.to_string()
}

/// Pulls the decoded URL out of a batchexecute reply
pub fn parse_batch_execute_response(response: &str) -> Result<String> {
    let chunk = response
        .split("\n\n")
        .nth(1)
        .ok_or_else(|| anyhow!("Unexpected batchexecute response format"))?;
    let envelope: Value = serde_json::from_str(chunk.trim()).context("Invalid batchexecute JSON")?;
    let inner = envelope[0][2]
        .as_str()
        .ok_or_else(|| anyhow!("Missing decoded payload in batchexecute response"))?;
    let payload: Value = serde_json::from_str(inner).context("Invalid decoded payload")?;
    payload[1]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Missing URL in decoded payload"))
}
