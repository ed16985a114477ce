use regex::Regex;
use std::collections::VecDeque;
use std::sync::OnceLock;

use crate::llm::count_tokens;

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>|<noscript\b[^>]*>.*?</noscript>|<!--.*?-->")
            .unwrap_or_else(|e| panic!("invalid script/style pattern: {}", e))
    })
}

fn block_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</(p|div|section|article|main|header|footer|li|ul|ol|tr|table|h[1-6]|blockquote|pre)\s*>")
            .unwrap_or_else(|e| panic!("invalid block pattern: {}", e))
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap_or_else(|e| panic!("invalid tag pattern: {}", e)))
}

fn og_image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<meta\s+[^>]*(?:property|name)\s*=\s*["'](?:og:image|twitter:image)["'][^>]*>"#)
            .unwrap_or_else(|e| panic!("invalid og:image pattern: {}", e))
    })
}

fn content_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)content\s*=\s*["']([^"']+)["']"#).unwrap_or_else(|e| panic!("invalid content pattern: {}", e))
    })
}

/// Visible text of an HTML page: scripts and styles removed, entities decoded,
/// one non-empty trimmed line per text line.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = script_style_re().replace_all(html, " ");
    let with_breaks = block_break_re().replace_all(&without_scripts, "\n");
    let without_tags = tag_re().replace_all(&with_breaks, "");
    let decoded = html_escape::decode_html_entities(&without_tags);

    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The page's `og:image` (or `twitter:image`) URL
pub fn extract_og_image(html: &str) -> Option<String> {
    og_image_re()
        .find_iter(html)
        .filter_map(|tag| content_attr_re().captures(tag.as_str()))
        .map(|c| html_escape::decode_html_entities(&c[1]).into_owned())
        .find(|url| !url.trim().is_empty())
}

/// Splits text into chunks of at most `chunk_size` characters, trying coarse
/// separators (paragraphs) before fine ones (words, characters).
#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveCharacterSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size),
            separators: ["\n\n", "\n", " ", ""].iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = "";
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut good: Vec<&str> = Vec::new();
        for split in splits {
            if split.chars().count() < self.chunk_size {
                good.push(split);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge_splits(&good, separator));
                good.clear();
            }
            if remaining.is_empty() {
                chunks.push(split.to_string());
            } else {
                chunks.extend(self.split_with(split, remaining));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge_splits(&good, separator));
        }
        chunks
    }

    fn merge_splits(&self, splits: &[&str], separator: &str) -> Vec<String> {
        let sep_len = separator.chars().count();
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        let join = |parts: &VecDeque<&str>| -> Option<String> {
            let doc = parts.iter().copied().collect::<Vec<_>>().join(separator);
            let doc = doc.trim();
            (!doc.is_empty()).then(|| doc.to_string())
        };

        for split in splits {
            let len = split.chars().count();
            let sep = if current.is_empty() { 0 } else { sep_len };
            if total + len + sep > self.chunk_size && !current.is_empty() {
                docs.extend(join(&current));
                while !current.is_empty()
                    && (total > self.chunk_overlap
                        || total + len + if current.is_empty() { 0 } else { sep_len } > self.chunk_size)
                {
                    let first = current.pop_front().map(|s| s.chars().count()).unwrap_or(0);
                    total = total.saturating_sub(first + if current.is_empty() { 0 } else { sep_len });
                }
            }
            total += len + if current.is_empty() { 0 } else { sep_len };
            current.push_back(split);
        }
        docs.extend(join(&current));
        docs
    }
}

/// Cuts text down to whole chunks fitting within `max_tokens`
pub fn truncate_to_token_budget(text: &str, max_tokens: usize) -> String {
    if count_tokens(text) <= max_tokens {
        return text.to_string();
    }

    let splitter = RecursiveCharacterSplitter::new(max_tokens * 3, 100);
    let mut kept = Vec::new();
    let mut used = 0;
    for chunk in splitter.split_text(text) {
        let tokens = count_tokens(&chunk);
        if used + tokens > max_tokens {
            break;
        }
        used += tokens;
        kept.push(chunk);
    }
    kept.join("\n\n")
}
