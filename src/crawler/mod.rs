//! Documentation crawler
//!
//! One sequential worker per domain, a global fetch ceiling, quality and
//! duplicate gates on every page, and step-boundary checkpoints so an
//! interrupted crawl resumes where it stopped.

pub mod checkpoint;
pub mod context;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod fingerprint;
pub mod frontier;
pub mod language;
pub mod orchestrator;
pub mod output;
pub mod quality;
pub mod robots;
pub mod sitemap;
pub mod state;
pub mod throttle;
pub mod trap_detection;
pub mod url_filter;
pub mod worker;

pub use checkpoint::{config_hash, CheckpointError, CheckpointSnapshot, CheckpointStore, LoadOutcome};
pub use context::{CrawlContext, CrawlProgress, FailureRecord, ShutdownHandle};
pub use error::CrawlError;
pub use extractor::{ContentExtractor, ExtractError, ExtractedPage, ExtractorRegistry};
pub use fetcher::{FetchError, FetchResponse, Fetcher, HttpFetcher, LimitedFetcher};
pub use fingerprint::{fingerprint, FingerprintStore};
pub use frontier::Frontier;
pub use orchestrator::{run, CrawlSummary, Orchestrator};
pub use output::{read_records, CrawlOutput, OutputError};
pub use quality::{accept, ContentKind, PageMetadata, QualityScore, QualityScorer};
pub use robots::{RobotsGate, RobotsRules};
pub use state::{DomainState, DomainStats, DomainStatus};
pub use throttle::{RateLimitState, Throttle};
pub use url_filter::{normalize, url_priority, NormalizedUrl, UrlFilter, UrlRejection};
pub use worker::{DomainWorker, PageOutcome, StepOutcome};
