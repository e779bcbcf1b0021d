//! Per-domain URL frontier
//!
//! A max-heap ordered by a single comparator: priority descending, then depth
//! ascending, then discovery sequence ascending.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::types::CrawlTarget;

impl PartialEq for CrawlTarget {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CrawlTarget {}

impl PartialOrd for CrawlTarget {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CrawlTarget {
    fn cmp(&self, other: &Self) -> Ordering {
        // "Greater" pops first
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.depth.cmp(&self.depth))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Queue of targets not yet fetched; a URL is queued at most once
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<CrawlTarget>", into = "Vec<CrawlTarget>")]
pub struct Frontier {
    heap: BinaryHeap<CrawlTarget>,
    queued: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a target. Returns false if its URL is already queued.
    pub fn push(&mut self, target: CrawlTarget) -> bool {
        if !self.queued.insert(target.url.as_str().to_string()) {
            return false;
        }
        self.heap.push(target);
        true
    }

    pub fn pop(&mut self) -> Option<CrawlTarget> {
        let target = self.heap.pop()?;
        self.queued.remove(target.url.as_str());
        Some(target)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.queued.contains(url)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl From<Vec<CrawlTarget>> for Frontier {
    fn from(targets: Vec<CrawlTarget>) -> Self {
        let mut frontier = Frontier::new();
        for target in targets {
            frontier.push(target);
        }
        frontier
    }
}

impl From<Frontier> for Vec<CrawlTarget> {
    /// Targets in pop order
    fn from(frontier: Frontier) -> Self {
        let mut targets = frontier.heap.into_sorted_vec();
        targets.reverse();
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::url_filter::normalize;
    use crate::types::SourceTag;
    use chrono::Utc;

    fn target(path: &str, priority: f32, depth: u8, seq: u64) -> CrawlTarget {
        CrawlTarget {
            url: normalize(&format!("https://docs.test{}", path), None, 2048).unwrap(),
            domain: "docs.test".to_string(),
            depth,
            priority,
            discovered_at: Utc::now(),
            seq,
            source_tag: SourceTag::Link,
        }
    }

    #[test]
    fn test_pop_order() {
        let mut frontier = Frontier::new();
        frontier.push(target("/low", 0.5, 1, 0));
        frontier.push(target("/deep", 1.0, 3, 1));
        frontier.push(target("/shallow-late", 1.0, 1, 5));
        frontier.push(target("/shallow-early", 1.0, 1, 2));
        frontier.push(target("/high", 1.5, 4, 9));

        let order: Vec<String> = std::iter::from_fn(|| frontier.pop())
            .map(|t| t.url.as_url().path().to_string())
            .collect();
        assert_eq!(order, vec!["/high", "/shallow-early", "/shallow-late", "/deep", "/low"]);
    }

    #[test]
    fn test_no_duplicate_queueing() {
        let mut frontier = Frontier::new();
        assert!(frontier.push(target("/a", 1.0, 1, 0)));
        assert!(!frontier.push(target("/a", 2.0, 0, 1)));
        assert_eq!(frontier.len(), 1);
        assert!(frontier.contains("https://docs.test/a"));

        frontier.pop();
        assert!(frontier.is_empty());
        assert!(!frontier.contains("https://docs.test/a"));
    }

    #[test]
    fn test_serde_keeps_order() {
        let mut frontier = Frontier::new();
        frontier.push(target("/b", 1.0, 2, 1));
        frontier.push(target("/a", 1.2, 1, 0));
        frontier.push(target("/c", 1.0, 2, 2));

        let json = serde_json::to_string(&frontier).unwrap();
        let mut restored: Frontier = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.pop().unwrap().seq, 0);
        assert_eq!(restored.pop().unwrap().seq, 1);
        assert_eq!(restored.pop().unwrap().seq, 2);
    }
}
