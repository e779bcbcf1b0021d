//! doccrawl: resumable documentation crawler for RAG pipelines
//!
//! Crawls configured documentation sites politely and keeps only pages worth
//! retrieving:
//! - one sequential worker per domain under a global fetch ceiling
//! - robots.txt, crawl-delay and adaptive backoff on 429/503
//! - quality scoring and SimHash deduplication of every page
//! - step-boundary checkpoints for exact resume after interruption

pub mod config;
pub mod crawler;
pub mod report;
pub mod types;
pub mod util;

pub use config::Config;
pub use types::*;
