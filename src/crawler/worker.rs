//! Domain worker
//!
//! One worker per domain, strictly sequential: at most one fetch in flight
//! for its domain at any time. Each `step` handles exactly one URL under a
//! shared hold on the step gate, so a checkpoint never observes a half
//! processed URL.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::context::CrawlContext;
use super::error::CrawlError;
use super::extractor::{ExtractedPage, ExtractorRegistry};
use super::fetcher::{FetchResponse, Fetcher};
use super::fingerprint::fingerprint;
use super::quality::{accept, PageMetadata, QualityScorer};
use super::sitemap::{self, SitemapLimits};
use super::state::{DomainState, DomainStats, DomainStatus, PendingRetry};
use super::throttle::Throttle;
use super::url_filter::{normalize, url_priority, NormalizedUrl, UrlFilter};
use crate::config::DomainPlan;
use crate::types::{CrawlTarget, PageRecord, SourceTag};

/// Final or intermediate result for one URL
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Accepted,
    Rejected(String),
    Duplicate,
    Disallowed,
    Failed(String),
    /// Transient failure; the URL is retried after `delay`
    Retrying { attempts: u32, delay: Duration },
}

impl PageOutcome {
    /// Whether the URL is done with
    pub fn is_final(&self) -> bool {
        !matches!(self, PageOutcome::Retrying { .. })
    }
}

/// Result of one `step`
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Processed { url: String, outcome: PageOutcome },
    /// The worker has nothing more to do
    Finished(DomainStatus),
    /// Shutdown was requested before a fetch started
    Shutdown,
}

/// How a given-up URL counts against the domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// Retries exhausted, or an error retrying cannot fix (DNS)
    Persistent,
    /// 4xx and similar
    Permanent,
    /// Not a document; says nothing about the domain's health
    Unsupported,
}

enum Verdict {
    Accepted(Box<PageRecord>),
    Rejected(String),
    Duplicate,
}

pub struct DomainWorker {
    ctx: Arc<CrawlContext>,
    plan: DomainPlan,
    filter: UrlFilter,
    scorer: QualityScorer,
    throttle: Throttle,
    state: Arc<Mutex<DomainState>>,
    fresh: bool,
}

impl DomainWorker {
    /// Worker for `plan`, resuming `restored` when given.
    ///
    /// Seeds are always offered to the frontier; ones already visited or
    /// queued are ignored, so a resumed domain keeps its place.
    pub fn new(ctx: Arc<CrawlContext>, plan: DomainPlan, restored: Option<DomainState>) -> Result<Self, CrawlError> {
        let filter = UrlFilter::new(&plan, &ctx.config.crawl)?;
        let scorer = QualityScorer::new(&ctx.config.quality, &plan.allowed_languages);
        let fresh = restored.is_none();

        let mut state = match restored {
            Some(mut state) => {
                if state.status != DomainStatus::Failed {
                    state.status = DomainStatus::Active;
                }
                state
            }
            None => DomainState::new(&plan.domain),
        };
        for seed in &plan.seeds {
            match normalize(seed.as_str(), None, filter.max_url_length()) {
                Ok(url) => {
                    let priority = url_priority(&url, 0);
                    state.enqueue(url, 0, priority, SourceTag::Seed, plan.max_depth);
                }
                Err(e) => warn!(domain = %plan.domain, seed = %seed, "Skipping seed: {}", e),
            }
        }

        let throttle = Throttle::new(&ctx.config.politeness, state.rate_limit.clone());
        Ok(Self {
            ctx,
            plan,
            filter,
            scorer,
            throttle,
            state: Arc::new(Mutex::new(state)),
            fresh,
        })
    }

    pub fn domain(&self) -> &str {
        &self.plan.domain
    }

    /// Shared handle on the worker's state, read by the checkpointer
    pub fn state(&self) -> Arc<Mutex<DomainState>> {
        self.state.clone()
    }

    /// Seed a fresh domain from its sitemaps. Does nothing for resumed domains.
    pub async fn prepare(&mut self) {
        if !self.fresh || !self.ctx.config.crawl.enable_sitemaps {
            return;
        }
        self.fresh = false;

        let ctx = self.ctx.clone();
        let _step = ctx.step_gate.read().await;
        if ctx.shutdown.is_triggered() {
            return;
        }
        let Some(seed) = self.plan.seeds.first().cloned() else {
            return;
        };
        let Ok(fallback) = seed.join("/sitemap.xml") else {
            return;
        };

        // Loads robots.txt, which is where sitemaps are advertised
        ctx.robots.rules_for(&seed).await;
        let advertised = ctx.robots.sitemap_urls(&self.plan.domain);
        let limits = SitemapLimits {
            max_sitemaps: ctx.config.crawl.max_sitemaps,
            max_urls: ctx.config.crawl.max_sitemap_urls,
        };
        let urls = sitemap::discover(
            ctx.fetcher.as_ref(),
            advertised,
            fallback,
            ctx.config.crawl.request_timeout(),
            limits,
        )
        .await;

        let mut added = 0;
        let mut state = self.state.lock();
        for raw in &urls {
            let Ok(url) = normalize(raw, None, self.filter.max_url_length()) else {
                continue;
            };
            if !self.filter.filter(&url) {
                continue;
            }
            let priority = url_priority(&url, 1);
            if state.enqueue(url, 1, priority, SourceTag::Sitemap, self.plan.max_depth) {
                added += 1;
            }
        }
        if added > 0 {
            info!(domain = %self.plan.domain, found = urls.len(), added, "Seeded frontier from sitemaps");
        }
    }

    /// Process exactly one URL, waiting out the domain's delay first.
    pub async fn step(&mut self) -> StepOutcome {
        if let Some(status) = self.finish_if_done() {
            return StepOutcome::Finished(status);
        }
        let ctx = self.ctx.clone();
        if ctx.shutdown.is_triggered() {
            return StepOutcome::Shutdown;
        }

        if let Some(wait) = self.throttle.wait_time() {
            self.set_status(DomainStatus::RateLimited);
            let completed = ctx.shutdown.sleep(wait).await;
            self.set_status(DomainStatus::Active);
            if !completed {
                return StepOutcome::Shutdown;
            }
        }

        let _step = ctx.step_gate.read().await;
        if ctx.shutdown.is_triggered() {
            return StepOutcome::Shutdown;
        }

        let next = {
            let mut state = self.state.lock();
            match state.pending_retry.take() {
                Some(retry) => Some((retry.target, retry.attempts)),
                None => state.pop_next().map(|target| (target, 0)),
            }
        };
        let Some((target, attempts)) = next else {
            return StepOutcome::Finished(self.finish_if_done().unwrap_or(DomainStatus::Exhausted));
        };

        let url = target.url.to_string();
        let outcome = self.process(target, attempts).await;
        debug!(domain = %self.plan.domain, url = %url, outcome = ?outcome, "Processed URL");

        self.state.lock().rate_limit = self.throttle.state().clone();
        if outcome.is_final() {
            ctx.progress.record_processed(outcome == PageOutcome::Accepted);
        }
        StepOutcome::Processed { url, outcome }
    }

    /// Step until the domain is exhausted, failed, or shut down.
    pub async fn run(mut self) -> DomainStats {
        self.prepare().await;
        loop {
            match self.step().await {
                StepOutcome::Processed { .. } => {}
                StepOutcome::Finished(_) | StepOutcome::Shutdown => break,
            }
        }
        let stats = self.state.lock().stats();
        stats
    }

    fn set_status(&self, status: DomainStatus) {
        let mut state = self.state.lock();
        if !state.status.is_terminal() {
            state.status = status;
        }
    }

    /// Mark the domain exhausted when its budget is spent or nothing is left
    fn finish_if_done(&self) -> Option<DomainStatus> {
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return Some(state.status);
        }
        let reason = if state.pages_accepted >= self.plan.max_pages as u64 {
            "page budget reached"
        } else if !state.has_work() {
            "frontier empty"
        } else {
            return None;
        };
        state.status = DomainStatus::Exhausted;
        info!(
            domain = %self.plan.domain,
            accepted = state.pages_accepted,
            processed = state.pages_processed(),
            reason,
            "Domain exhausted"
        );
        Some(DomainStatus::Exhausted)
    }

    async fn process(&mut self, target: CrawlTarget, attempts: u32) -> PageOutcome {
        let ctx = self.ctx.clone();
        let url = target.url.as_url().clone();

        if !ctx.robots.allowed(&url, &ctx.config.politeness.user_agent).await {
            self.state.lock().pages_disallowed += 1;
            return PageOutcome::Disallowed;
        }
        self.throttle.set_crawl_delay(ctx.robots.crawl_delay(&self.plan.domain));

        let started = tokio::time::Instant::now();
        let result = ctx.fetcher.fetch(&url, ctx.config.crawl.request_timeout()).await;
        let latency = started.elapsed();
        self.state.lock().last_fetch_at = Some(Utc::now());

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_transient() => return self.retry_later(target, attempts, None, e.class()),
            Err(e) => {
                self.throttle.record_attempt();
                return self.give_up(&target, e.class(), Failure::Persistent);
            }
        };
        self.state.lock().pages_fetched += 1;

        match response.status {
            429 | 503 => {
                let class = format!("http_{}", response.status);
                return self.retry_later(target, attempts, response.retry_after(), &class);
            }
            status if status >= 500 => {
                return self.retry_later(target, attempts, None, &format!("http_{}", status));
            }
            _ if !response.is_success() => {
                self.throttle.record_attempt();
                return self.give_up(&target, &format!("http_{}", response.status), Failure::Permanent);
            }
            _ => {}
        }

        self.throttle.record_success(latency);
        self.state.lock().consecutive_failures = 0;
        self.handle_page(target, response)
    }

    fn retry_later(&mut self, target: CrawlTarget, attempts: u32, retry_after: Option<Duration>, class: &str) -> PageOutcome {
        let attempts = attempts + 1;
        let delay = self.throttle.record_failure(retry_after);
        if attempts > self.ctx.config.crawl.max_retries {
            return self.give_up(&target, class, Failure::Persistent);
        }
        debug!(
            domain = %self.plan.domain,
            url = %target.url,
            class,
            attempts,
            delay_ms = delay.as_millis() as u64,
            "Transient failure, retrying later"
        );
        self.state.lock().pending_retry = Some(PendingRetry { target, attempts });
        PageOutcome::Retrying { attempts, delay }
    }

    fn give_up(&self, target: &CrawlTarget, class: &str, failure: Failure) -> PageOutcome {
        let mut state = self.state.lock();
        state.pages_failed += 1;
        self.ctx.progress.record_failure(target.url.as_str(), class);

        match failure {
            Failure::Persistent => warn!(domain = %self.plan.domain, url = %target.url, class, "Giving up on URL"),
            _ => debug!(domain = %self.plan.domain, url = %target.url, class, "Dropping URL"),
        }

        if failure != Failure::Unsupported {
            state.consecutive_failures += 1;
            if state.consecutive_failures >= self.ctx.config.crawl.max_consecutive_failures {
                state.status = DomainStatus::Failed;
                warn!(
                    domain = %self.plan.domain,
                    consecutive = state.consecutive_failures,
                    last_class = class,
                    "Domain failed"
                );
            }
        }
        PageOutcome::Failed(class.to_string())
    }

    fn handle_page(&mut self, target: CrawlTarget, response: FetchResponse) -> PageOutcome {
        let Some(kind) = ExtractorRegistry::detect(response.content_type().as_deref(), response.final_url.path()) else {
            return self.give_up(&target, "content_type", Failure::Unsupported);
        };

        // A redirect lands on a URL of its own; it must not be fetched again
        let page_url = match normalize(response.final_url.as_str(), None, self.filter.max_url_length()) {
            Ok(final_url) if final_url != target.url => {
                if final_url.domain() != self.plan.domain {
                    self.state.lock().pages_rejected += 1;
                    return PageOutcome::Rejected("redirected off domain".to_string());
                }
                self.state.lock().visited.insert(final_url.as_str().to_string());
                final_url
            }
            _ => target.url.clone(),
        };

        let page = match self.ctx.extractor.extract(&response.body, kind.mime()) {
            Ok(page) => page,
            Err(e) => {
                self.state.lock().pages_rejected += 1;
                return PageOutcome::Rejected(format!("extraction: {}", e));
            }
        };

        let verdict = self.judge(&target, &page_url, &page, response.status);
        let follow = matches!(verdict, Verdict::Accepted(_)) || self.ctx.config.crawl.follow_links_on_reject;

        let outcome = {
            let mut state = self.state.lock();
            match verdict {
                Verdict::Accepted(record) => {
                    state.fingerprints.insert(record.content_hash);
                    state.pages_accepted += 1;
                    self.ctx.output.push(*record);
                    PageOutcome::Accepted
                }
                Verdict::Rejected(reason) => {
                    state.pages_rejected += 1;
                    PageOutcome::Rejected(reason)
                }
                Verdict::Duplicate => {
                    state.pages_duplicate += 1;
                    PageOutcome::Duplicate
                }
            }
        };

        if follow {
            self.enqueue_links(&page.links, page_url.as_url(), target.depth.saturating_add(1));
        }
        outcome
    }

    /// Quality gates, score, then deduplication
    fn judge(&self, target: &CrawlTarget, page_url: &NormalizedUrl, page: &ExtractedPage, status: u16) -> Verdict {
        let meta = PageMetadata {
            url: page_url.as_str(),
            title: &page.title,
            language: page.language.as_deref(),
        };
        if let Some(rejection) = self.scorer.gate(&page.text, &meta) {
            return Verdict::Rejected(rejection.to_string());
        }
        let score = self.scorer.score(&page.text, &meta);
        if !accept(&score, self.plan.quality_threshold) {
            return Verdict::Rejected(format!("low_quality ({:.1})", score.value));
        }

        let fingerprints = &self.ctx.fingerprints;
        if !page.title.is_empty() && fingerprints.is_duplicate_title(&self.plan.domain, &page.title) {
            return Verdict::Duplicate;
        }
        let hash = fingerprint(&page.text);
        let title = (!page.title.is_empty()).then_some(page.title.as_str());
        if !fingerprints.record_if_new(&self.plan.domain, hash, page_url.as_str(), title) {
            return Verdict::Duplicate;
        }

        Verdict::Accepted(Box::new(PageRecord {
            url: page_url.to_string(),
            domain: self.plan.domain.clone(),
            title: page.title.clone(),
            content: page.text.clone(),
            word_count: page.text.split_whitespace().count(),
            quality_score: score.value,
            language: score.language,
            content_hash: hash,
            fetched_at: Utc::now(),
            http_status: status,
            category: self.plan.category.clone(),
            content_type: score.content_kind.as_str().to_string(),
            depth: target.depth,
        }))
    }

    fn enqueue_links(&self, links: &[String], base: &Url, depth: u8) -> usize {
        if depth > self.plan.max_depth {
            return 0;
        }
        let mut state = self.state.lock();
        let mut added = 0;
        for href in links {
            let Ok(url) = normalize(href, Some(base), self.filter.max_url_length()) else {
                continue;
            };
            if !self.filter.filter(&url) {
                continue;
            }
            let priority = url_priority(&url, depth);
            if state.enqueue(url, depth, priority, SourceTag::Link, self.plan.max_depth) {
                added += 1;
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crawler::extractor::ContentExtractor;
    use crate::crawler::fetcher::FetchError;
    use crate::crawler::fingerprint::FingerprintStore;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};

    const DOMAIN: &str = "docs.test";

    /// Scripted responses per URL; the last one repeats
    #[derive(Default)]
    struct ScriptedFetcher {
        responses: Mutex<HashMap<String, VecDeque<(u16, String)>>>,
        log: Mutex<Vec<String>>,
        page_times: Mutex<Vec<tokio::time::Instant>>,
    }

    impl ScriptedFetcher {
        fn on(&self, url: &str, responses: &[(u16, &str)]) {
            self.responses.lock().insert(
                url.to_string(),
                responses.iter().map(|(s, b)| (*s, b.to_string())).collect(),
            );
        }

        fn requested(&self, url: &str) -> usize {
            self.log.lock().iter().filter(|u| u.as_str() == url).count()
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<FetchResponse, FetchError> {
            self.log.lock().push(url.to_string());
            if url.path() != "/robots.txt" {
                self.page_times.lock().push(tokio::time::Instant::now());
            }
            let mut responses = self.responses.lock();
            let (status, body) = match responses.get_mut(url.as_str()) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
                Some(queue) => queue.front().cloned().unwrap_or_default(),
                None => (404, String::new()),
            };
            Ok(FetchResponse {
                final_url: url.clone(),
                status,
                headers: vec![("content-type".to_string(), "text/html".to_string())],
                body: body.into_bytes(),
            })
        }
    }

    const ROUTER_TEXT: &str = "The router matches each incoming request path against the table of \
        registered routes. Handlers are plain async functions that receive extractors and return \
        a response. Nested routers let you mount a whole group of routes under one prefix.";
    const CONFIG_TEXT: &str = "Settings are read from a TOML file at startup and every field is \
        validated before the server binds its socket. Environment variables override values from \
        the file, which is useful for secrets in container deployments and CI pipelines.";

    fn page(title: &str, text: &str, links: &[&str]) -> String {
        let links: String = links.iter().map(|l| format!("<li><a href=\"{}\">{}</a></li>", l, l)).collect();
        format!(
            "<html lang=\"en\"><head><title>{title}</title></head><body><main>\
             <h1>{title}</h1><p>{text}</p><h2>Example</h2>\
             <pre><code>let app = App::new();\napp.run()?;</code></pre>\
             <ul>{links}</ul></main></body></html>"
        )
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.crawl.enable_sitemaps = false;
        config.crawl.max_retries = 3;
        config.politeness.default_delay_ms = 0;
        config.politeness.jitter_ms = 0;
        config.politeness.latency_factor = 0.0;
        config.politeness.backoff_base_ms = 1_000;
        config.quality.threshold = 0.0;
        config.quality.min_word_count = 10;
        config.quality.min_char_count = 50;
        config
    }

    fn plan(config: &Config, seeds: &[&str]) -> DomainPlan {
        DomainPlan {
            domain: DOMAIN.to_string(),
            seeds: seeds.iter().map(|s| Url::parse(s).unwrap()).collect(),
            category: "docs".to_string(),
            max_pages: 100,
            quality_threshold: config.quality.threshold,
            max_depth: 4,
            allowed_languages: vec!["en".to_string()],
            allowed_prefixes: Vec::new(),
            priority: 1,
        }
    }

    fn worker(config: Config, fetcher: Arc<ScriptedFetcher>, seeds: &[&str]) -> DomainWorker {
        let plan = plan(&config, seeds);
        let fingerprints = Arc::new(FingerprintStore::in_memory(&config.dedup));
        let extractor: Arc<dyn ContentExtractor> = Arc::new(ExtractorRegistry::default());
        let ctx = Arc::new(CrawlContext::new(Arc::new(config), fetcher, extractor, fingerprints));
        DomainWorker::new(ctx, plan, None).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepts_and_follows_links() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let index = page("Routing guide", ROUTER_TEXT, &["/guide/config", "https://other.test/x"]);
        let config_page = page("Configuration guide", CONFIG_TEXT, &["/"]);
        fetcher.on("https://docs.test/", &[(200, index.as_str())]);
        fetcher.on("https://docs.test/guide/config", &[(200, config_page.as_str())]);

        let worker = worker(config(), fetcher.clone(), &["https://docs.test/"]);
        let state = worker.state();
        let stats = worker.run().await;

        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.status, DomainStatus::Exhausted);
        assert_eq!(fetcher.requested("https://docs.test/"), 1);
        assert_eq!(fetcher.requested("https://other.test/x"), 0);
        assert_eq!(state.lock().fingerprints.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_429_with_growing_backoff() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let body = page("Routing guide", ROUTER_TEXT, &[]);
        fetcher.on(
            "https://docs.test/",
            &[(429, ""), (429, ""), (429, ""), (200, body.as_str())],
        );

        let mut worker = worker(config(), fetcher.clone(), &["https://docs.test/"]);
        let mut delays = Vec::new();
        loop {
            match worker.step().await {
                StepOutcome::Processed { outcome: PageOutcome::Retrying { delay, .. }, .. } => delays.push(delay),
                StepOutcome::Processed { outcome, .. } => {
                    assert_eq!(outcome, PageOutcome::Accepted);
                    break;
                }
                other => panic!("unexpected step outcome {:?}", other),
            }
        }

        assert_eq!(delays.len(), 3);
        assert!(delays.windows(2).all(|w| w[1] >= w[0]), "{:?}", delays);
        assert_eq!(fetcher.requested("https://docs.test/"), 4);
        assert_eq!(worker.state().lock().status, DomainStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.on("https://docs.test/", &[(503, "")]);

        let worker = worker(config(), fetcher.clone(), &["https://docs.test/"]);
        let stats = worker.run().await;

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.accepted, 0);
        // First attempt plus three retries
        assert_eq!(fetcher.requested("https://docs.test/"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_not_retried() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let worker = worker(config(), fetcher.clone(), &["https://docs.test/missing"]);
        let stats = worker.run().await;

        assert_eq!(stats.failed, 1);
        assert_eq!(fetcher.requested("https://docs.test/missing"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies_after_missing_pages() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let mut config = config();
        config.politeness.default_delay_ms = 2_000;
        let seeds = [
            "https://docs.test/a",
            "https://docs.test/b",
            "https://docs.test/c",
            "https://docs.test/d",
        ];

        let worker = worker(config, fetcher.clone(), &seeds);
        let state = worker.state();
        let stats = worker.run().await;

        assert_eq!(stats.failed, 4);
        let times = fetcher.page_times.lock().clone();
        assert_eq!(times.len(), 4);
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps.iter().all(|g| *g >= Duration::from_secs(2)), "{:?}", gaps);
        // A missing page says nothing about load, so no backoff builds up
        assert_eq!(state.lock().rate_limit.backoff_level, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_failures_mark_domain_failed() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let mut config = config();
        config.crawl.max_consecutive_failures = 2;
        let seeds = ["https://docs.test/a", "https://docs.test/b", "https://docs.test/c"];

        let worker = worker(config, fetcher.clone(), &seeds);
        let stats = worker.run().await;

        assert_eq!(stats.status, DomainStatus::Failed);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.queued, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_content_not_accepted_twice() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let body = page("Configuration guide", CONFIG_TEXT, &[]);
        fetcher.on("https://docs.test/a", &[(200, body.as_str())]);
        fetcher.on("https://docs.test/b", &[(200, body.as_str())]);

        let worker = worker(config(), fetcher, &["https://docs.test/a", "https://docs.test/b"]);
        let stats = worker.run().await;

        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.duplicate, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_before_fetch() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let mut worker = worker(config(), fetcher.clone(), &["https://docs.test/"]);
        worker.ctx.shutdown.trigger();

        assert_eq!(worker.step().await, StepOutcome::Shutdown);
        assert!(fetcher.log.lock().is_empty());
        assert!(worker.state().lock().has_work());
    }
}
