//! Shared crawl context handed to every domain worker

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify, RwLock};

use super::extractor::ContentExtractor;
use super::fetcher::{Fetcher, LimitedFetcher};
use super::fingerprint::FingerprintStore;
use super::output::CrawlOutput;
use super::robots::RobotsGate;
use crate::config::Config;

/// Persistent failures kept for the summary
const RECENT_FAILURES: usize = 20;

/// Cooperative shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Stop new fetches; sleeping workers wake immediately
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once shutdown is triggered
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns once the flag is set
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Sleep for `duration` unless shutdown interrupts. Returns false when interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.triggered() => false,
        }
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A URL that was given up on
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub url: String,
    pub class: String,
    pub at: DateTime<Utc>,
}

/// Crawl-wide counters read by the checkpointer and the progress display
#[derive(Debug, Default)]
pub struct CrawlProgress {
    processed: AtomicU64,
    accepted: AtomicU64,
    every_pages: u64,
    checkpoint_due: Notify,
    failures: Mutex<VecDeque<FailureRecord>>,
}

impl CrawlProgress {
    /// `every_pages` of 0 never asks for a checkpoint
    pub fn new(every_pages: u64) -> Self {
        Self {
            every_pages,
            ..Default::default()
        }
    }

    pub fn record_processed(&self, accepted: bool) {
        if accepted {
            self.accepted.fetch_add(1, Ordering::Relaxed);
        }
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if self.every_pages > 0 && processed % self.every_pages == 0 {
            self.checkpoint_due.notify_one();
        }
    }

    pub fn record_failure(&self, url: &str, class: &str) {
        let mut failures = self.failures.lock();
        if failures.len() == RECENT_FAILURES {
            failures.pop_front();
        }
        failures.push_back(FailureRecord {
            url: url.to_string(),
            class: class.to_string(),
            at: Utc::now(),
        });
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn recent_failures(&self) -> Vec<FailureRecord> {
        self.failures.lock().iter().cloned().collect()
    }

    /// Resolves when enough pages were processed since the last checkpoint
    pub async fn checkpoint_due(&self) {
        self.checkpoint_due.notified().await
    }
}

/// Everything the workers share. There is no global state.
pub struct CrawlContext {
    pub config: Arc<Config>,
    pub fetcher: Arc<LimitedFetcher>,
    pub extractor: Arc<dyn ContentExtractor>,
    pub robots: Arc<RobotsGate>,
    pub fingerprints: Arc<FingerprintStore>,
    /// Held shared by a worker for one URL step, exclusively by the checkpointer
    pub step_gate: Arc<RwLock<()>>,
    pub shutdown: ShutdownHandle,
    pub output: Arc<CrawlOutput>,
    pub progress: Arc<CrawlProgress>,
}

impl CrawlContext {
    /// Wire the shared pieces around `fetcher`. Every fetch, robots.txt and
    /// sitemaps included, goes through one slot-limited wrapper.
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn ContentExtractor>,
        fingerprints: Arc<FingerprintStore>,
    ) -> Self {
        let fetcher = Arc::new(LimitedFetcher::new(fetcher, config.crawl.max_concurrent_fetches));
        let robots = Arc::new(RobotsGate::new(
            fetcher.clone(),
            &config.politeness.user_agent,
            config.crawl.request_timeout(),
        ));
        let output = Arc::new(CrawlOutput::new(&config.crawl.output_path()));
        let progress = Arc::new(CrawlProgress::new(config.checkpoint.every_pages));
        Self {
            config,
            fetcher,
            extractor,
            robots,
            fingerprints,
            step_gate: Arc::new(RwLock::new(())),
            shutdown: ShutdownHandle::new(),
            output,
            progress,
        }
    }
}
