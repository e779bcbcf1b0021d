//! End-to-end crawls against in-memory sites

use async_trait::async_trait;
use doccrawl::config::{Config, SourceConfig, StalePolicy};
use doccrawl::crawler::{
    read_records, ContentExtractor, CrawlError, CrawlSummary, DomainStatus, ExtractError, ExtractedPage, FetchError,
    FetchResponse, Fetcher, Orchestrator, ShutdownHandle,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

const SENTENCES: &[&str] = &[
    "The router matches each incoming request path against the table of registered routes.",
    "Handlers are plain async functions that receive extractors and return a response.",
    "Settings are read from a TOML file at startup and every field is validated first.",
    "Environment variables override values from the file, which is useful for secrets.",
    "Middleware wraps the whole service and can inspect or modify every request in turn.",
    "Errors returned by a handler are converted into responses with a matching status code.",
    "Shared state is stored in an extension and cloned cheaply into each request handler.",
    "The test client sends requests to the application without binding a real socket.",
];

const TOPICS: &[&str] = &[
    "routing", "sessions", "templates", "caching", "logging", "metrics", "uploads", "websockets",
    "cookies", "tracing", "streams", "timeouts", "retries", "pooling", "signals", "compression",
    "migrations", "fixtures", "benchmarks", "deployment",
];

/// Scripted site: responses per URL (the last one repeats), robots.txt per
/// host, and bookkeeping of every request.
#[derive(Default)]
struct Site {
    responses: Mutex<HashMap<String, VecDeque<(u16, String)>>>,
    robots: Mutex<HashMap<String, String>>,
    log: Mutex<Vec<String>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    stop_after: Mutex<Option<(usize, ShutdownHandle)>>,
}

impl Site {
    fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    fn on(&self, url: &str, responses: &[(u16, &str)]) {
        self.responses.lock().insert(
            url.to_string(),
            responses.iter().map(|(s, b)| (*s, b.to_string())).collect(),
        );
    }

    fn page(&self, url: &str, body: String) {
        self.on(url, &[(200, body.as_str())]);
    }

    fn robots(&self, host: &str, body: &str) {
        self.robots.lock().insert(host.to_string(), body.to_string());
    }

    /// Trigger `shutdown` once `pages` page fetches have started
    fn stop_after(&self, pages: usize, shutdown: ShutdownHandle) {
        *self.stop_after.lock() = Some((pages, shutdown));
    }

    fn requested(&self, url: &str) -> usize {
        self.log.lock().iter().filter(|u| u.as_str() == url).count()
    }

    fn page_requests(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|u| !u.ends_with("/robots.txt"))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Fetcher for Site {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<FetchResponse, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.log.lock().push(url.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if url.path() == "/robots.txt" {
            let host = url.host_str().unwrap_or_default();
            return Ok(match self.robots.lock().get(host) {
                Some(body) => response(url, 200, "text/plain", body),
                None => response(url, 404, "text/plain", ""),
            });
        }

        if let Some((pages, shutdown)) = self.stop_after.lock().as_ref() {
            if self.page_requests().len() >= *pages {
                shutdown.trigger();
            }
        }

        let mut responses = self.responses.lock();
        let (status, body) = match responses.get_mut(url.as_str()) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => (404, String::new()),
        };
        Ok(response(url, status, "text/html; charset=utf-8", &body))
    }
}

fn response(url: &Url, status: u16, content_type: &str, body: &str) -> FetchResponse {
    FetchResponse {
        final_url: url.clone(),
        status,
        headers: vec![("content-type".to_string(), content_type.to_string())],
        body: body.as_bytes().to_vec(),
    }
}

/// Documentation page with text that differs for every `n`
fn doc_page(title: &str, n: usize, links: &[String]) -> String {
    let text: Vec<&str> = (0..SENTENCES.len()).map(|i| SENTENCES[(i + n) % SENTENCES.len()]).collect();
    let links: String = links.iter().map(|l| format!("<li><a href=\"{l}\">{l}</a></li>")).collect();
    let topic = TOPICS[n % TOPICS.len()];
    format!(
        "<html lang=\"en\"><head><title>{title}</title></head><body><main>\
         <h1>{title}</h1><p>Section {n} of the guide covers {topic} in depth: how {topic} is \
         configured, when {topic} should be enabled, and which {topic} options matter in \
         production.</p><p>{}</p><h2>Example</h2>\
         <pre><code>let app = App::new();\napp.run()?;</code></pre>\
         <ul>{links}</ul></main></body></html>",
        text.join(" ")
    )
}

/// Index page linking to `pages` guide pages, each linking back and to the next
fn build_docs(site: &Site, host: &str, pages: usize, offset: usize) {
    let guides: Vec<String> = (0..pages).map(|i| format!("/guide/{i}")).collect();
    site.page(&format!("https://{host}/"), doc_page(&format!("{host} overview"), offset, &guides));
    for i in 0..pages {
        let links = vec!["/".to_string(), format!("/guide/{}", (i + 1) % pages)];
        site.page(
            &format!("https://{host}/guide/{i}"),
            doc_page(&format!("{host} guide {i}"), offset + i + 1, &links),
        );
    }
}

fn config(dir: &TempDir, hosts: &[&str]) -> Config {
    let mut config = Config::default();
    config.crawl.data_dir = dir.path().to_path_buf();
    config.crawl.enable_sitemaps = false;
    config.politeness.default_delay_ms = 0;
    config.politeness.jitter_ms = 0;
    config.politeness.latency_factor = 0.0;
    config.politeness.backoff_base_ms = 1_000;
    config.quality.threshold = 0.0;
    config.quality.min_word_count = 10;
    config.quality.min_char_count = 50;
    config.dedup.near_duplicate_distance = 0;
    config.sources = hosts
        .iter()
        .map(|h| SourceConfig::from_url(&format!("https://{h}/")))
        .collect();
    config
}

async fn crawl(config: Config, site: Arc<Site>) -> Result<CrawlSummary, CrawlError> {
    Orchestrator::with_fetcher(config, site).run().await
}

fn accepted_urls(dir: &TempDir) -> BTreeSet<String> {
    read_records(&dir.path().join("crawled.jsonl"))
        .unwrap()
        .into_iter()
        .map(|r| r.url)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_every_page_fetched_once() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(Site::default());
    build_docs(&site, "docs.test", 6, 0);

    let summary = crawl(config(&dir, &["docs.test"]), site.clone()).await.unwrap();

    let records = read_records(&dir.path().join("crawled.jsonl")).unwrap();
    assert_eq!(records.len(), 7);
    assert_eq!(summary.accepted, 7);
    assert_eq!(summary.domains[0].status, DomainStatus::Exhausted);

    let requests = site.page_requests();
    let unique: BTreeSet<_> = requests.iter().collect();
    assert_eq!(requests.len(), unique.len(), "refetched: {:?}", requests);
    assert_eq!(accepted_urls(&dir).len(), records.len());
}

#[tokio::test(start_paused = true)]
async fn test_robots_disallowed_paths_never_fetched() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(Site::default());
    site.robots("docs.test", "User-agent: *\nDisallow: /private/\n");
    let links = vec!["/guide/0".to_string(), "/private/keys".to_string()];
    site.page("https://docs.test/", doc_page("Overview", 0, &links));
    site.page("https://docs.test/guide/0", doc_page("Guide", 1, &[]));
    site.page("https://docs.test/private/keys", doc_page("Keys", 2, &[]));

    let summary = crawl(config(&dir, &["docs.test"]), site.clone()).await.unwrap();

    assert_eq!(site.requested("https://docs.test/private/keys"), 0);
    assert_eq!(summary.disallowed, 1);
    assert_eq!(summary.accepted, 2);
}

#[tokio::test(start_paused = true)]
async fn test_identical_pages_stored_once() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(Site::default());
    let links = vec!["/a".to_string(), "/b".to_string()];
    site.page("https://docs.test/", doc_page("Overview", 0, &links));
    let copy = doc_page("Copied page", 1, &[]);
    site.page("https://docs.test/a", copy.clone());
    site.page("https://docs.test/b", copy);

    let summary = crawl(config(&dir, &["docs.test"]), site).await.unwrap();

    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.duplicate, 1);
    let records = read_records(&dir.path().join("crawled.jsonl")).unwrap();
    let hashes: BTreeSet<u64> = records.iter().map(|r| r.content_hash).collect();
    assert_eq!(hashes.len(), records.len());
}

#[tokio::test(start_paused = true)]
async fn test_resume_matches_uninterrupted_crawl() {
    let reference_dir = TempDir::new().unwrap();
    let reference_site = Arc::new(Site::default());
    build_docs(&reference_site, "docs.test", 8, 0);
    crawl(config(&reference_dir, &["docs.test"]), reference_site)
        .await
        .unwrap();
    let expected = accepted_urls(&reference_dir);
    assert_eq!(expected.len(), 9);

    let dir = TempDir::new().unwrap();
    let first_site = Arc::new(Site::default());
    build_docs(&first_site, "docs.test", 8, 0);
    let orchestrator = Orchestrator::with_fetcher(config(&dir, &["docs.test"]), first_site.clone());
    first_site.stop_after(3, orchestrator.shutdown_handle());
    let first = orchestrator.run().await.unwrap();
    assert!(first.interrupted);
    assert!(first.accepted < 9);

    let second_site = Arc::new(Site::default());
    build_docs(&second_site, "docs.test", 8, 0);
    let second = crawl(config(&dir, &["docs.test"]), second_site.clone()).await.unwrap();
    assert!(second.resumed);
    assert!(!second.interrupted);
    assert_eq!(second.accepted, 9);

    assert_eq!(accepted_urls(&dir), expected);
    let before: BTreeSet<String> = first_site.page_requests().into_iter().collect();
    for url in second_site.page_requests() {
        assert!(!before.contains(&url), "{} fetched in both runs", url);
    }
}

#[tokio::test(start_paused = true)]
async fn test_higher_threshold_accepts_subset() {
    let mut previous: Option<BTreeSet<String>> = None;
    for threshold in [0.0, 30.0, 60.0, 90.0] {
        let dir = TempDir::new().unwrap();
        let site = Arc::new(Site::default());
        build_docs(&site, "docs.test", 5, 0);
        site.page("https://docs.test/guide/4", "<html><body><p>Short stub.</p></body></html>".to_string());

        let mut config = config(&dir, &["docs.test"]);
        config.quality.threshold = threshold;
        crawl(config, site).await.unwrap();

        let accepted = accepted_urls(&dir);
        for record in read_records(&dir.path().join("crawled.jsonl")).unwrap() {
            assert!(record.quality_score >= threshold);
        }
        if let Some(previous) = &previous {
            assert!(accepted.is_subset(previous), "threshold {}: {:?} vs {:?}", threshold, accepted, previous);
        }
        previous = Some(accepted);
    }
}

#[tokio::test(start_paused = true)]
async fn test_fetch_concurrency_ceiling() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(Site::with_latency(Duration::from_millis(50)));
    let hosts = ["a.test", "b.test", "c.test", "d.test"];
    for (i, host) in hosts.iter().enumerate() {
        build_docs(&site, host, 3, i * 5);
    }

    let mut config = config(&dir, &hosts);
    config.crawl.max_concurrent_fetches = 2;
    let summary = crawl(config, site.clone()).await.unwrap();

    assert_eq!(summary.accepted, 16);
    assert!(site.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert!(summary.peak_in_flight <= 2);
    assert!(summary.peak_in_flight >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_page_budget_exhausts_domain() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(Site::default());
    build_docs(&site, "docs.test", 10, 0);

    let mut config = config(&dir, &["docs.test"]);
    config.quality.threshold = 10.0;
    config.sources[0].max_pages = Some(5);
    let summary = crawl(config, site).await.unwrap();

    assert_eq!(summary.domains[0].status, DomainStatus::Exhausted);
    let records = read_records(&dir.path().join("crawled.jsonl")).unwrap();
    assert!(records.len() <= 5);
    assert!(records.iter().all(|r| r.quality_score >= 10.0));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_page_eventually_accepted() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(Site::default());
    let body = doc_page("Overview", 0, &[]);
    site.on(
        "https://docs.test/",
        &[(429, ""), (429, ""), (429, ""), (200, body.as_str())],
    );

    let summary = crawl(config(&dir, &["docs.test"]), site.clone()).await.unwrap();

    assert_eq!(site.requested("https://docs.test/"), 4);
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.domains[0].status, DomainStatus::Exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_stale_checkpoint_policies() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(Site::default());
    build_docs(&site, "docs.test", 2, 0);
    crawl(config(&dir, &["docs.test"]), site.clone()).await.unwrap();

    let changed = || {
        let mut config = config(&dir, &["docs.test"]);
        config.quality.threshold = 5.0;
        config
    };

    let err = crawl(changed(), site.clone()).await.unwrap_err();
    assert!(matches!(err, CrawlError::StaleCheckpoint { .. }));
    assert!(err.to_string().contains("--discard-stale"));

    let mut resume = changed();
    resume.checkpoint.stale_policy = StalePolicy::ResumeAnyway;
    let resumed = crawl(resume, site.clone()).await.unwrap();
    assert!(resumed.resumed);

    // The resumed run saved its snapshot under the new hash; go back to the old one
    let mut discard = config(&dir, &["docs.test"]);
    discard.checkpoint.stale_policy = StalePolicy::Discard;
    let fresh = crawl(discard, site).await.unwrap();
    assert!(!fresh.resumed);
    assert_eq!(fresh.processed_this_run, 3);
}

#[tokio::test(start_paused = true)]
async fn test_www_host_kept_for_requests() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(Site::default());
    site.robots("www.learn.test", "User-agent: *\nDisallow: /guide/1\n");
    build_docs(&site, "www.learn.test", 3, 0);

    let summary = crawl(config(&dir, &["www.learn.test"]), site.clone()).await.unwrap();

    assert_eq!(site.requested("https://www.learn.test/robots.txt"), 1);
    assert_eq!(site.requested("https://learn.test/robots.txt"), 0);
    assert_eq!(site.requested("https://www.learn.test/guide/1"), 0);
    let requests = site.page_requests();
    assert!(requests.iter().all(|u| u.starts_with("https://www.learn.test/")), "{:?}", requests);
    assert_eq!(summary.domains[0].domain, "learn.test");
    assert_eq!(summary.accepted, 3);
    assert!(accepted_urls(&dir).contains("https://www.learn.test/guide/0"));
}

/// Reads bodies laid out as a title line, `-> href` link lines, then text
#[derive(Default)]
struct OutlineExtractor {
    calls: AtomicUsize,
}

impl ContentExtractor for OutlineExtractor {
    fn extract(&self, body: &[u8], _content_type: &str) -> Result<ExtractedPage, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = std::str::from_utf8(body).map_err(|e| ExtractError::ParseError(e.to_string()))?;
        let mut lines = body.lines();
        let title = lines.next().ok_or(ExtractError::NoContent)?.trim().to_string();
        let (links, text): (Vec<&str>, Vec<&str>) =
            lines.filter(|l| !l.trim().is_empty()).partition(|l| l.starts_with("-> "));
        Ok(ExtractedPage {
            text: text.join("\n"),
            title,
            language: Some("en".to_string()),
            links: links.iter().map(|l| l.trim_start_matches("-> ").to_string()).collect(),
        })
    }
}

fn outline_page(title: &str, n: usize, links: &[&str]) -> String {
    let topic = TOPICS[n % TOPICS.len()];
    let links: Vec<String> = links.iter().map(|l| format!("-> {l}")).collect();
    let text: Vec<&str> = (0..SENTENCES.len()).map(|i| SENTENCES[(i + n) % SENTENCES.len()]).collect();
    format!(
        "{title}\n{}\nThis outline explains {topic} and when {topic} should be enabled.\n{}",
        links.join("\n"),
        text.join("\n")
    )
}

#[tokio::test(start_paused = true)]
async fn test_custom_extractor_shapes_records() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(Site::default());
    site.page("https://docs.test/", outline_page("Outline start", 0, &["/next"]));
    site.page("https://docs.test/next", outline_page("Outline next", 3, &[]));
    let extractor = Arc::new(OutlineExtractor::default());

    let summary = Orchestrator::with_fetcher(config(&dir, &["docs.test"]), site.clone())
        .with_extractor(extractor.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    assert_eq!(site.requested("https://docs.test/next"), 1);
    assert_eq!(summary.accepted, 2);
    let records = read_records(&dir.path().join("crawled.jsonl")).unwrap();
    let titles: BTreeSet<&str> = records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, BTreeSet::from(["Outline start", "Outline next"]));
    assert!(records.iter().all(|r| !r.content.contains("-> ")));
    assert!(records.iter().all(|r| r.content.starts_with("This outline explains")));
}
