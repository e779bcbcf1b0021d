//! Markdown and plain-text extraction

use regex::Regex;
use std::sync::OnceLock;

use super::{ContentExtractor, ExtractError, ExtractedPage};
use crate::util::truncate_str;

static RE_MD_LINK: OnceLock<Regex> = OnceLock::new();

fn decode(body: &[u8]) -> Result<String, ExtractError> {
    let text = String::from_utf8_lossy(body).replace("\r\n", "\n");
    if text.trim().is_empty() {
        return Err(ExtractError::NoContent);
    }
    Ok(text)
}

/// Strip a leading `---` front-matter block, returning its `title:` if any
fn split_front_matter(text: &str) -> (Option<String>, &str) {
    let Some(rest) = text.strip_prefix("---\n") else {
        return (None, text);
    };
    let Some(end) = rest.find("\n---") else {
        return (None, text);
    };
    let title = rest[..end].lines().find_map(|line| {
        line.strip_prefix("title:")
            .map(|t| t.trim().trim_matches(['"', '\'']).to_string())
            .filter(|t| !t.is_empty())
    });
    let body = rest[end + 4..].trim_start_matches(|c: char| c != '\n').trim_start_matches('\n');
    (title, body)
}

/// Markdown documents, kept as-is since the text is already structured
pub struct MarkdownExtractor;

impl ContentExtractor for MarkdownExtractor {
    fn extract(&self, body: &[u8], _content_type: &str) -> Result<ExtractedPage, ExtractError> {
        let raw = decode(body)?;
        let (front_title, text) = split_front_matter(&raw);

        let title = front_title
            .or_else(|| {
                text.lines()
                    .find_map(|l| l.strip_prefix("# ").map(|t| t.trim().to_string()))
            })
            .or_else(|| {
                text.lines()
                    .map(str::trim_start)
                    .find(|l| l.starts_with('#'))
                    .map(|l| l.trim_start_matches('#').trim().to_string())
            })
            .unwrap_or_default();

        let re = RE_MD_LINK.get_or_init(|| Regex::new(r"\]\(\s*<?([^)\s>]+)>?(?:\s+[^)]*)?\)").unwrap());
        let mut links: Vec<String> = Vec::new();
        for cap in re.captures_iter(text) {
            let target = cap[1].to_string();
            if !target.starts_with('#') && !links.contains(&target) {
                links.push(target);
            }
        }

        Ok(ExtractedPage {
            text: text.trim().to_string(),
            title,
            language: None,
            links,
        })
    }
}

/// Plain text: the first non-empty line doubles as the title
pub struct PlainTextExtractor;

impl ContentExtractor for PlainTextExtractor {
    fn extract(&self, body: &[u8], _content_type: &str) -> Result<ExtractedPage, ExtractError> {
        let text = decode(body)?;
        let title = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(|l| truncate_str(l, 120))
            .unwrap_or_default();
        Ok(ExtractedPage {
            text: text.trim().to_string(),
            title,
            language: None,
            links: Vec::new(),
        })
    }
}
