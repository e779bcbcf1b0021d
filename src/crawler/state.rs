//! Serializable per-domain crawl state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::frontier::Frontier;
use super::throttle::RateLimitState;
use super::url_filter::NormalizedUrl;
use crate::types::{CrawlTarget, SourceTag};

/// Overlay status of a domain worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    #[default]
    Active,
    RateLimited,
    Exhausted,
    Failed,
}

impl DomainStatus {
    /// Whether the worker has stopped for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, DomainStatus::Exhausted | DomainStatus::Failed)
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainStatus::Active => write!(f, "active"),
            DomainStatus::RateLimited => write!(f, "rate_limited"),
            DomainStatus::Exhausted => write!(f, "exhausted"),
            DomainStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A target waiting out a backoff before its next attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRetry {
    pub target: CrawlTarget,
    /// Attempts already made
    pub attempts: u32,
}

/// Everything a domain worker owns. A snapshot of this is enough to resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainState {
    pub domain: String,
    pub frontier: Frontier,
    pub visited: BTreeSet<String>,
    /// Fingerprints of the pages accepted for this domain
    pub fingerprints: BTreeSet<u64>,
    pub pages_fetched: u64,
    pub pages_accepted: u64,
    #[serde(default)]
    pub pages_rejected: u64,
    #[serde(default)]
    pub pages_duplicate: u64,
    #[serde(default)]
    pub pages_failed: u64,
    #[serde(default)]
    pub pages_disallowed: u64,
    #[serde(default)]
    pub consecutive_failures: u32,
    pub last_fetch_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rate_limit: RateLimitState,
    pub status: DomainStatus,
    #[serde(default)]
    pub pending_retry: Option<PendingRetry>,
    #[serde(default)]
    pub next_seq: u64,
}

impl DomainState {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            frontier: Frontier::new(),
            visited: BTreeSet::new(),
            fingerprints: BTreeSet::new(),
            pages_fetched: 0,
            pages_accepted: 0,
            pages_rejected: 0,
            pages_duplicate: 0,
            pages_failed: 0,
            pages_disallowed: 0,
            consecutive_failures: 0,
            last_fetch_at: None,
            rate_limit: RateLimitState::default(),
            status: DomainStatus::Active,
            pending_retry: None,
            next_seq: 0,
        }
    }

    /// Queue a URL unless it was already visited, is already queued, or is too deep.
    pub fn enqueue(
        &mut self,
        url: NormalizedUrl,
        depth: u8,
        priority: f32,
        source_tag: SourceTag,
        max_depth: u8,
    ) -> bool {
        if depth > max_depth || self.visited.contains(url.as_str()) || self.frontier.contains(url.as_str()) {
            return false;
        }
        let target = CrawlTarget {
            url,
            domain: self.domain.clone(),
            depth,
            priority,
            discovered_at: Utc::now(),
            seq: self.next_seq,
            source_tag,
        };
        self.next_seq += 1;
        self.frontier.push(target)
    }

    /// Next unvisited target, marked visited as it is taken
    pub fn pop_next(&mut self) -> Option<CrawlTarget> {
        while let Some(target) = self.frontier.pop() {
            if self.visited.insert(target.url.as_str().to_string()) {
                return Some(target);
            }
        }
        None
    }

    /// Whether anything is left to fetch
    pub fn has_work(&self) -> bool {
        self.pending_retry.is_some() || !self.frontier.is_empty()
    }

    /// URLs that reached a final outcome
    pub fn pages_processed(&self) -> u64 {
        self.pages_accepted + self.pages_rejected + self.pages_duplicate + self.pages_failed + self.pages_disallowed
    }

    pub fn stats(&self) -> DomainStats {
        DomainStats {
            domain: self.domain.clone(),
            fetched: self.pages_fetched,
            accepted: self.pages_accepted,
            rejected: self.pages_rejected,
            duplicate: self.pages_duplicate,
            failed: self.pages_failed,
            disallowed: self.pages_disallowed,
            queued: self.frontier.len(),
            status: self.status,
        }
    }
}

/// Per-domain counters reported in the crawl summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainStats {
    pub domain: String,
    pub fetched: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub duplicate: u64,
    pub failed: u64,
    pub disallowed: u64,
    pub queued: usize,
    pub status: DomainStatus,
}
