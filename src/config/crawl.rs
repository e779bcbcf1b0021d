//! Crawl, politeness, and checkpoint configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::DEFAULT_USER_AGENT;

/// Crawl-wide behaviour shared by every domain worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Directory holding checkpoints, fingerprints and crawl output
    pub data_dir: PathBuf,
    /// Name of the JSONL output file inside `data_dir`
    pub output_file: String,
    /// Global ceiling on in-flight fetches across all domains
    pub max_concurrent_fetches: usize,
    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,
    /// Response bodies larger than this are refused
    pub max_body_bytes: usize,
    /// Retries per URL for transient fetch failures
    pub max_retries: u32,
    /// Consecutive failed URLs before a domain is marked failed
    pub max_consecutive_failures: u32,
    /// Keep following links found on rejected or duplicate pages
    pub follow_links_on_reject: bool,
    /// Default page budget for sources that do not set one
    pub default_max_pages: usize,
    /// Default link depth for sources that do not set one
    pub default_max_depth: u8,
    /// Maximum normalized URL length
    pub max_url_length: usize,
    /// Regex patterns a URL must match (any) to be crawled; empty means all
    pub include_patterns: Vec<String>,
    /// Regex patterns that exclude a URL
    pub exclude_patterns: Vec<String>,
    /// Only follow URLs that look like documentation
    pub require_doc_keywords: bool,
    /// Seed frontiers from sitemaps advertised in robots.txt
    pub enable_sitemaps: bool,
    /// Sitemap files read per domain, nested indexes included
    pub max_sitemaps: usize,
    /// URLs taken from sitemaps per domain
    pub max_sitemap_urls: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_file: "crawled.jsonl".to_string(),
            max_concurrent_fetches: 16,
            request_timeout_secs: 30,
            max_body_bytes: 10 * 1024 * 1024,
            max_retries: 3,
            max_consecutive_failures: 20,
            follow_links_on_reject: true,
            default_max_pages: 5000,
            default_max_depth: 4,
            max_url_length: 2048,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            require_doc_keywords: false,
            enable_sitemaps: true,
            max_sitemaps: 3,
            max_sitemap_urls: 50,
        }
    }
}

impl CrawlConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn output_path(&self) -> PathBuf {
        self.data_dir.join(&self.output_file)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.data_dir.join("checkpoints")
    }

    pub fn fingerprint_path(&self) -> PathBuf {
        self.data_dir.join("fingerprints.jsonl")
    }
}

/// Per-domain rate limiting and adaptive backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    /// User agent sent with every request and matched against robots.txt
    pub user_agent: String,
    /// Baseline delay between fetches to the same domain (milliseconds)
    pub default_delay_ms: u64,
    /// Upper bound for the baseline delay, robots crawl-delay included
    pub max_delay_ms: u64,
    /// First backoff step after a failure or 429/503 (milliseconds)
    pub backoff_base_ms: u64,
    /// Backoff ceiling (milliseconds)
    pub max_backoff_ms: u64,
    /// Consecutive successes that reset the backoff to baseline
    pub reset_after_successes: u32,
    /// Share of the average response latency added to the baseline delay
    pub latency_factor: f64,
    /// Random extra delay in `[0, jitter_ms)`
    pub jitter_ms: u64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_base_ms: 1_000,
            max_backoff_ms: 300_000,
            reset_after_successes: 3,
            latency_factor: 0.5,
            jitter_ms: 500,
        }
    }
}

impl PolitenessConfig {
    pub fn default_delay(&self) -> Duration {
        Duration::from_millis(self.default_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// What to do when the saved checkpoint was written under another configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Abort and ask the operator to decide
    #[default]
    Refuse,
    /// Delete the stale checkpoint and start over
    Discard,
    /// Restore the stale state under the new configuration
    ResumeAnyway,
}

/// Checkpoint cadence and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Resume from the latest checkpoint when one exists
    pub auto_resume: bool,
    /// Seconds between periodic checkpoints
    pub interval_secs: u64,
    /// Processed pages between checkpoints (0 disables the count trigger)
    pub every_pages: u64,
    /// Previous snapshots kept next to the live one
    pub keep_snapshots: usize,
    /// Handling of a checkpoint whose configuration hash does not match
    pub stale_policy: StalePolicy,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            auto_resume: true,
            interval_secs: 60,
            every_pages: 200,
            keep_snapshots: 2,
            stale_policy: StalePolicy::Refuse,
        }
    }
}

impl CheckpointConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
