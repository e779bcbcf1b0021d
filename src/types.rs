//! Core types shared by the crawler and the commands

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crawler::url_filter::NormalizedUrl;

/// How a URL entered the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Seed,
    Sitemap,
    Link,
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTag::Seed => write!(f, "seed"),
            SourceTag::Sitemap => write!(f, "sitemap"),
            SourceTag::Link => write!(f, "link"),
        }
    }
}

/// A URL waiting in a domain frontier. Immutable once enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTarget {
    pub url: NormalizedUrl,
    pub domain: String,
    /// Hops from a seed
    pub depth: u8,
    /// Higher is crawled sooner
    pub priority: f32,
    pub discovered_at: DateTime<Utc>,
    /// Per-domain discovery counter; FIFO tie-break
    pub seq: u64,
    pub source_tag: SourceTag,
}

/// One accepted page, written as a line of `crawled.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub domain: String,
    pub title: String,
    pub content: String,
    pub word_count: usize,
    pub quality_score: f32,
    pub language: Option<String>,
    pub content_hash: u64,
    pub fetched_at: DateTime<Utc>,
    pub http_status: u16,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub depth: u8,
}
