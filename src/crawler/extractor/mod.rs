//! Content extraction
//!
//! A `ContentExtractor` turns a raw body into text plus the few facts the
//! crawl needs (title, declared language, outbound links). `ExtractorRegistry`
//! picks the variant from the response content type, falling back to the URL
//! extension when the server does not say.

mod html;
mod markdown;

pub use html::HtmlExtractor;
pub use markdown::{MarkdownExtractor, PlainTextExtractor};

use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during content extraction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no content found")]
    NoContent,

    #[error("unsupported content type: {0}")]
    UnsupportedType(String),

    #[error("failed to parse: {0}")]
    ParseError(String),
}

/// Text and metadata pulled out of one response body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    /// Main content, with headings, lists and code fences kept in markdown form
    pub text: String,
    pub title: String,
    /// Language declared by the document, if any
    pub language: Option<String>,
    /// Raw link targets, unresolved
    pub links: Vec<String>,
}

/// Source type of a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Html,
    Markdown,
    PlainText,
}

impl SourceKind {
    /// From a media type such as `text/html`
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => Some(Self::Html),
            "text/markdown" | "text/x-markdown" => Some(Self::Markdown),
            "text/plain" => Some(Self::PlainText),
            _ => None,
        }
    }

    /// Canonical media type
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Markdown => "text/markdown",
            Self::PlainText => "text/plain",
        }
    }

    /// From the last path segment's extension; extension-less paths are HTML
    pub fn from_path(path: &str) -> Option<Self> {
        let last = path.rsplit('/').next().unwrap_or_default();
        match last.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
            None => Some(Self::Html),
            Some(ext) => match ext.as_str() {
                "html" | "htm" | "xhtml" | "php" | "asp" | "aspx" | "jsp" => Some(Self::Html),
                "md" | "markdown" | "mdx" => Some(Self::Markdown),
                "txt" | "rst" => Some(Self::PlainText),
                _ => None,
            },
        }
    }
}

/// Turns raw bytes into an `ExtractedPage`
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, body: &[u8], content_type: &str) -> Result<ExtractedPage, ExtractError>;
}

/// Dispatches to the extractor matching the content type
pub struct ExtractorRegistry {
    html: Arc<dyn ContentExtractor>,
    markdown: Arc<dyn ContentExtractor>,
    plain: Arc<dyn ContentExtractor>,
}

impl ExtractorRegistry {
    pub fn new(
        html: Arc<dyn ContentExtractor>,
        markdown: Arc<dyn ContentExtractor>,
        plain: Arc<dyn ContentExtractor>,
    ) -> Self {
        Self { html, markdown, plain }
    }

    /// Source kind for a response: the media type when recognised, else the
    /// URL path when the server sent none or a generic one
    pub fn detect(content_type: Option<&str>, path: &str) -> Option<SourceKind> {
        match content_type {
            Some(ct) => SourceKind::from_mime(ct).or_else(|| {
                let generic = ct.starts_with("application/octet-stream") || ct.trim().is_empty();
                generic.then(|| SourceKind::from_path(path)).flatten()
            }),
            None => SourceKind::from_path(path),
        }
    }

    fn for_kind(&self, kind: SourceKind) -> &dyn ContentExtractor {
        match kind {
            SourceKind::Html => self.html.as_ref(),
            SourceKind::Markdown => self.markdown.as_ref(),
            SourceKind::PlainText => self.plain.as_ref(),
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new(
            Arc::new(HtmlExtractor::new()),
            Arc::new(MarkdownExtractor),
            Arc::new(PlainTextExtractor),
        )
    }
}

impl ContentExtractor for ExtractorRegistry {
    fn extract(&self, body: &[u8], content_type: &str) -> Result<ExtractedPage, ExtractError> {
        let kind = SourceKind::from_mime(content_type)
            .ok_or_else(|| ExtractError::UnsupportedType(content_type.to_string()))?;
        self.for_kind(kind).extract(body, content_type)
    }
}
