//! Crawl orchestrator
//!
//! Builds the shared context, restores the last checkpoint, runs one worker
//! task per domain and checkpoints periodically until every domain is done
//! or shutdown is requested.

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::checkpoint::{config_hash, CheckpointSnapshot, CheckpointStore, LoadOutcome};
use super::context::{CrawlContext, CrawlProgress, FailureRecord, ShutdownHandle};
use super::error::{CrawlError, Result};
use super::extractor::{ContentExtractor, ExtractorRegistry};
use super::fetcher::{Fetcher, HttpFetcher};
use super::fingerprint::FingerprintStore;
use super::state::{DomainState, DomainStats};
use super::worker::DomainWorker;
use crate::config::{Config, StalePolicy};

/// What a crawl run did
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub domains: Vec<DomainStats>,
    pub fetched: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub duplicate: u64,
    pub failed: u64,
    pub disallowed: u64,
    /// URLs finished during this run
    pub processed_this_run: u64,
    pub elapsed: Duration,
    pub pages_per_sec: f64,
    pub peak_in_flight: usize,
    pub recent_failures: Vec<FailureRecord>,
    pub resumed: bool,
    pub interrupted: bool,
}

impl CrawlSummary {
    fn new(
        domains: Vec<DomainStats>,
        progress: &CrawlProgress,
        elapsed: Duration,
        peak_in_flight: usize,
        resumed: bool,
        interrupted: bool,
    ) -> Self {
        let sum = |f: fn(&DomainStats) -> u64| domains.iter().map(f).sum::<u64>();
        let processed = progress.processed();
        let secs = elapsed.as_secs_f64();
        Self {
            fetched: sum(|d| d.fetched),
            accepted: sum(|d| d.accepted),
            rejected: sum(|d| d.rejected),
            duplicate: sum(|d| d.duplicate),
            failed: sum(|d| d.failed),
            disallowed: sum(|d| d.disallowed),
            processed_this_run: processed,
            elapsed,
            pages_per_sec: if secs > 0.0 { processed as f64 / secs } else { 0.0 },
            peak_in_flight,
            recent_failures: progress.recent_failures(),
            resumed,
            interrupted,
            domains,
        }
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn ContentExtractor>,
    shutdown: ShutdownHandle,
    progress: Arc<CrawlProgress>,
    listen_for_signals: bool,
}

impl Orchestrator {
    /// Orchestrator fetching over HTTP
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config.politeness.user_agent, config.crawl.max_body_bytes)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher>) -> Self {
        let progress = Arc::new(CrawlProgress::new(config.checkpoint.every_pages));
        Self {
            config: Arc::new(config),
            fetcher,
            extractor: Arc::new(ExtractorRegistry::default()),
            shutdown: ShutdownHandle::new(),
            progress,
            listen_for_signals: false,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Trigger shutdown on Ctrl-C or SIGTERM
    pub fn listen_for_signals(mut self, listen: bool) -> Self {
        self.listen_for_signals = listen;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Live counters, for progress display
    pub fn progress(&self) -> Arc<CrawlProgress> {
        self.progress.clone()
    }

    pub async fn run(self) -> Result<CrawlSummary> {
        let started = Instant::now();
        let config = self.config.clone();
        let plans = config
            .domain_plans()
            .map_err(|e| CrawlError::Config(format!("{:#}", e)))?;
        let hash = config_hash(&config, &plans).map_err(|e| CrawlError::Config(e.to_string()))?;

        let data_dir = &config.crawl.data_dir;
        std::fs::create_dir_all(data_dir).map_err(|source| CrawlError::Io {
            path: data_dir.clone(),
            source,
        })?;

        let store = CheckpointStore::new(&config.crawl.checkpoint_dir(), config.checkpoint.keep_snapshots);
        let mut restored = self.restore(&store, &hash)?;
        // Loaded before any worker exists, so no page is judged without them
        let fingerprints = Arc::new(FingerprintStore::open(&config.crawl.fingerprint_path(), &config.dedup)?);
        let resumed = !restored.is_empty();
        for (domain, state) in &restored {
            fingerprints.absorb(domain, state.fingerprints.iter());
        }
        info!(
            domains = plans.len(),
            resumed,
            fingerprints = fingerprints.len(),
            "Starting crawl"
        );

        let mut ctx = CrawlContext::new(config.clone(), self.fetcher.clone(), self.extractor.clone(), fingerprints);
        ctx.shutdown = self.shutdown.clone();
        ctx.progress = self.progress.clone();
        let ctx = Arc::new(ctx);

        // Plans arrive sorted by priority, so workers start in that order
        let mut states: BTreeMap<String, Arc<Mutex<DomainState>>> = BTreeMap::new();
        let mut workers = Vec::with_capacity(plans.len());
        for plan in plans {
            let domain = plan.domain.clone();
            let worker = DomainWorker::new(ctx.clone(), plan, restored.remove(&domain))?;
            states.insert(domain, worker.state());
            workers.push(worker);
        }
        // Domains no longer configured are carried along untouched
        for (domain, state) in restored {
            states.insert(domain, Arc::new(Mutex::new(state)));
        }

        if self.listen_for_signals {
            spawn_signal_listener(self.shutdown.clone());
        }

        let handles: Vec<_> = workers.into_iter().map(|w| tokio::spawn(w.run())).collect();
        let workers_done = join_all(handles);
        tokio::pin!(workers_done);

        let interval = config.checkpoint.interval().max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let results = loop {
            tokio::select! {
                results = &mut workers_done => break results,
                _ = ticker.tick() => {}
                _ = ctx.progress.checkpoint_due() => {}
            }
            if let Err(e) = checkpoint(&ctx, &states, &store, &hash).await {
                ctx.shutdown.trigger();
                return Err(e);
            }
        };

        // Final flush and snapshot, on completion and on shutdown alike
        checkpoint(&ctx, &states, &store, &hash).await?;

        let mut domains = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(stats) => domains.push(stats),
                Err(e) => return Err(CrawlError::Worker(e.to_string())),
            }
        }

        let summary = CrawlSummary::new(
            domains,
            &ctx.progress,
            started.elapsed(),
            ctx.fetcher.peak_in_flight(),
            resumed,
            ctx.shutdown.is_triggered(),
        );
        info!(
            accepted = summary.accepted,
            processed = summary.processed_this_run,
            elapsed_secs = summary.elapsed.as_secs(),
            interrupted = summary.interrupted,
            "Crawl finished"
        );
        Ok(summary)
    }

    /// Domain states to resume from, per the stale policy
    fn restore(&self, store: &CheckpointStore, hash: &str) -> Result<BTreeMap<String, DomainState>> {
        if !self.config.checkpoint.auto_resume {
            return Ok(BTreeMap::new());
        }
        match store.load(hash)? {
            LoadOutcome::Restored(snapshot) => Ok(snapshot.domain_states),
            LoadOutcome::NotFound => Ok(BTreeMap::new()),
            LoadOutcome::Stale { found, expected, snapshot } => match self.config.checkpoint.stale_policy {
                StalePolicy::Refuse => Err(CrawlError::StaleCheckpoint { found, expected }),
                StalePolicy::Discard => {
                    warn!(found = %found, expected = %expected, "Discarding checkpoint from a different configuration");
                    store.discard()?;
                    // The fingerprint table belongs to the discarded crawl
                    let path = self.config.crawl.fingerprint_path();
                    match std::fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(source) => return Err(CrawlError::Io { path, source }),
                    }
                    Ok(BTreeMap::new())
                }
                StalePolicy::ResumeAnyway => {
                    warn!(found = %found, expected = %expected, "Resuming checkpoint from a different configuration");
                    Ok(snapshot.domain_states)
                }
            },
        }
    }
}

/// Run a crawl over HTTP, stopping cleanly on Ctrl-C
pub async fn run(config: Config) -> Result<CrawlSummary> {
    Orchestrator::new(config)?.listen_for_signals(true).run().await
}

/// Flush output, persist fingerprints, then save a snapshot, all between steps.
async fn checkpoint(
    ctx: &CrawlContext,
    states: &BTreeMap<String, Arc<Mutex<DomainState>>>,
    store: &CheckpointStore,
    hash: &str,
) -> Result<()> {
    let _exclusive = ctx.step_gate.write().await;

    let records = ctx.output.flush()?;
    let fingerprints = ctx.fingerprints.persist()?;
    let domain_states = states
        .iter()
        .map(|(domain, state)| (domain.clone(), state.lock().clone()))
        .collect();
    let snapshot = CheckpointSnapshot::new(domain_states, hash);
    store.save(&snapshot)?;

    let queued: usize = snapshot.domain_states.values().map(|s| s.frontier.len()).sum();
    info!(
        accepted = ctx.progress.accepted(),
        processed = ctx.progress.processed(),
        queued,
        records,
        fingerprints,
        "Checkpoint saved"
    );
    Ok(())
}

fn spawn_signal_listener(shutdown: ShutdownHandle) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, finishing in-flight pages"),
            _ = wait_for_sigterm() => info!("Received SIGTERM, finishing in-flight pages"),
            _ = shutdown.triggered() => return,
        }
        shutdown.trigger();
    });
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
