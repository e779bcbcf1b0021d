//! Errors that abort a crawl run

use thiserror::Error;

use super::checkpoint::CheckpointError;
use super::fingerprint::FingerprintError;
use super::output::OutputError;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid URL pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("I/O on '{path}': {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(
        "checkpoint was written under a different configuration (found {found}, expected {expected}); \
         rerun with --resume-stale to keep it, --discard-stale to start over, or run `doccrawl clean`"
    )]
    StaleCheckpoint { found: String, expected: String },

    #[error("worker task failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, CrawlError>;
