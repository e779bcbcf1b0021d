//! Crawl checkpoints
//!
//! A snapshot holds every domain's state and the hash of the configuration
//! it was taken under. Saves are atomic: the snapshot is written to a temp
//! file, synced, then renamed over `crawl_state.json`. The previous live
//! snapshot is kept as `crawl_state.1.json`, older ones shift up to
//! `keep_snapshots`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::state::DomainState;
use crate::config::{Config, DomainPlan};

const STATE_FILE_STEM: &str = "crawl_state";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt checkpoint '{path}': {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("checkpoint format version {found} is newer than supported {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Deep copy of all worker state, taken between steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    pub format_version: u32,
    pub domain_states: BTreeMap<String, DomainState>,
    pub crawl_config_hash: String,
    pub saved_at: DateTime<Utc>,
}

impl CheckpointSnapshot {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(domain_states: BTreeMap<String, DomainState>, crawl_config_hash: &str) -> Self {
        Self {
            format_version: Self::CURRENT_VERSION,
            domain_states,
            crawl_config_hash: crawl_config_hash.to_string(),
            saved_at: Utc::now(),
        }
    }

    /// Accepted pages across every domain
    pub fn pages_accepted(&self) -> u64 {
        self.domain_states.values().map(|s| s.pages_accepted).sum()
    }
}

/// Result of looking for a checkpoint to resume from
#[derive(Debug)]
pub enum LoadOutcome {
    Restored(CheckpointSnapshot),
    NotFound,
    /// Written under a different configuration
    Stale {
        found: String,
        expected: String,
        snapshot: Box<CheckpointSnapshot>,
    },
}

/// Hash of every setting that decides which pages are crawled and accepted
pub fn config_hash(config: &Config, plans: &[DomainPlan]) -> Result<String, serde_json::Error> {
    #[derive(Serialize)]
    struct Canonical<'a> {
        plans: &'a [DomainPlan],
        quality: &'a crate::config::QualityConfig,
        dedup: &'a crate::config::DedupConfig,
        include_patterns: &'a [String],
        exclude_patterns: &'a [String],
        require_doc_keywords: bool,
        max_url_length: usize,
        follow_links_on_reject: bool,
    }

    let canonical = serde_json::to_vec(&Canonical {
        plans,
        quality: &config.quality,
        dedup: &config.dedup,
        include_patterns: &config.crawl.include_patterns,
        exclude_patterns: &config.crawl.exclude_patterns,
        require_doc_keywords: config.crawl.require_doc_keywords,
        max_url_length: config.crawl.max_url_length,
        follow_links_on_reject: config.crawl.follow_links_on_reject,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Snapshot files in one directory
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    keep_snapshots: usize,
}

impl CheckpointStore {
    pub fn new(dir: &Path, keep_snapshots: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            keep_snapshots,
        }
    }

    pub fn live_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", STATE_FILE_STEM))
    }

    fn rotation_path(&self, n: usize) -> PathBuf {
        self.dir.join(format!("{}.{}.json", STATE_FILE_STEM, n))
    }

    fn io_err(path: &Path) -> impl Fn(std::io::Error) -> CheckpointError + '_ {
        move |source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Atomically replace the live snapshot, rotating the previous one.
    pub fn save(&self, snapshot: &CheckpointSnapshot) -> Result<PathBuf, CheckpointError> {
        fs::create_dir_all(&self.dir).map_err(Self::io_err(&self.dir))?;
        let live = self.live_path();
        let encoded = serde_json::to_vec(snapshot).map_err(|source| CheckpointError::Corrupt {
            path: live.clone(),
            source,
        })?;

        let temp_path = live.with_extension("json.tmp");
        let mut file = File::create(&temp_path).map_err(Self::io_err(&temp_path))?;
        file.write_all(&encoded).map_err(Self::io_err(&temp_path))?;
        file.sync_all().map_err(Self::io_err(&temp_path))?;

        if self.keep_snapshots > 0 && live.exists() {
            for n in (1..self.keep_snapshots).rev() {
                let from = self.rotation_path(n);
                if from.exists() {
                    let to = self.rotation_path(n + 1);
                    fs::rename(&from, &to).map_err(Self::io_err(&from))?;
                }
            }
            // Copy so the live file never disappears
            fs::copy(&live, self.rotation_path(1)).map_err(Self::io_err(&live))?;
        }
        fs::rename(&temp_path, &live).map_err(Self::io_err(&live))?;

        debug!(path = %live.display(), bytes = encoded.len(), "Saved checkpoint");
        Ok(live)
    }

    fn read(path: &Path) -> Result<Option<CheckpointSnapshot>, CheckpointError> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_err(path)(e)),
        };
        let snapshot: CheckpointSnapshot = serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        if snapshot.format_version > CheckpointSnapshot::CURRENT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: snapshot.format_version,
                supported: CheckpointSnapshot::CURRENT_VERSION,
            });
        }
        Ok(Some(snapshot))
    }

    /// Load the latest readable snapshot and check it against `expected_hash`.
    ///
    /// A corrupt live snapshot falls back to the newest readable rotation;
    /// if none is readable the corruption is returned.
    pub fn load(&self, expected_hash: &str) -> Result<LoadOutcome, CheckpointError> {
        let live = self.live_path();
        let snapshot = match Self::read(&live) {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => self.read_rotation()?,
            Err(err @ CheckpointError::Corrupt { .. }) => {
                warn!(path = %live.display(), "Live checkpoint unreadable, trying older snapshots: {}", err);
                match self.read_rotation()? {
                    Some(snapshot) => Some(snapshot),
                    None => return Err(err),
                }
            }
            Err(e) => return Err(e),
        };

        let Some(snapshot) = snapshot else {
            return Ok(LoadOutcome::NotFound);
        };
        if snapshot.crawl_config_hash != expected_hash {
            return Ok(LoadOutcome::Stale {
                found: snapshot.crawl_config_hash.clone(),
                expected: expected_hash.to_string(),
                snapshot: Box::new(snapshot),
            });
        }
        info!(
            domains = snapshot.domain_states.len(),
            accepted = snapshot.pages_accepted(),
            saved_at = %snapshot.saved_at,
            "Restored checkpoint"
        );
        Ok(LoadOutcome::Restored(snapshot))
    }

    fn read_rotation(&self) -> Result<Option<CheckpointSnapshot>, CheckpointError> {
        for n in 1..=self.keep_snapshots {
            let path = self.rotation_path(n);
            match Self::read(&path) {
                Ok(Some(snapshot)) => {
                    warn!(path = %path.display(), "Using rotated checkpoint");
                    return Ok(Some(snapshot));
                }
                Ok(None) => {}
                Err(CheckpointError::Corrupt { .. }) => {
                    warn!(path = %path.display(), "Skipping corrupt rotated checkpoint");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Remove the live snapshot, its rotations and any leftover temp file.
    /// Returns how many files were removed.
    pub fn discard(&self) -> Result<usize, CheckpointError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Self::io_err(&self.dir)(e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(Self::io_err(&self.dir))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(STATE_FILE_STEM) && (name.ends_with(".json") || name.ends_with(".tmp")) {
                let path = entry.path();
                fs::remove_file(&path).map_err(Self::io_err(&path))?;
                removed += 1;
            }
        }
        info!(dir = %self.dir.display(), removed, "Discarded checkpoints");
        Ok(removed)
    }
}
