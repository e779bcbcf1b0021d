//! Content fingerprinting and the durable fingerprint store
//!
//! Pages are fingerprinted with a 64-bit SimHash over word 3-gram shingles, so
//! pages that differ only in a few boilerplate words land on the same or a
//! very close hash. The store keeps every accepted fingerprint per dedup scope
//! (one domain, or everything) and appends new entries to a JSONL table at
//! each checkpoint; it is loaded in full before any worker starts.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{DedupConfig, DedupScope};
use crate::util::{compute_simhash, open_line_log};

const GLOBAL_SCOPE: &str = "*";

#[derive(Debug, Error)]
#[error("fingerprint store I/O on '{path}': {source}")]
pub struct FingerprintError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

/// SimHash fingerprint of page text.
///
/// Text is lower-cased and whitespace-collapsed first, so byte-identical and
/// whitespace-only variants always share a fingerprint.
pub fn fingerprint(text: &str) -> u64 {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    if words.len() < 3 {
        return compute_simhash(words.iter().copied());
    }
    let shingles: Vec<String> = words.windows(3).map(|w| w.join(" ")).collect();
    compute_simhash(shingles.iter().map(String::as_str))
}

/// Number of differing bits between two fingerprints
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// One line of the fingerprint table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FingerprintEntry {
    scope: String,
    hash: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    url: String,
    recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Index {
    hashes: HashMap<String, HashSet<u64>>,
    titles: HashMap<String, HashMap<String, usize>>,
    pending: Vec<FingerprintEntry>,
}

impl Index {
    fn insert(&mut self, entry: &FingerprintEntry) -> bool {
        let inserted = self.hashes.entry(entry.scope.clone()).or_default().insert(entry.hash);
        if inserted {
            if let Some(title) = entry.title.as_deref().and_then(normalize_title) {
                *self
                    .titles
                    .entry(entry.scope.clone())
                    .or_default()
                    .entry(title)
                    .or_default() += 1;
            }
        }
        inserted
    }
}

fn normalize_title(title: &str) -> Option<String> {
    let t = title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    (!t.is_empty()).then_some(t)
}

/// Shared, durable set of accepted content fingerprints
#[derive(Debug)]
pub struct FingerprintStore {
    scope: DedupScope,
    near_duplicate_distance: u32,
    duplicate_title_threshold: usize,
    path: Option<PathBuf>,
    index: Mutex<Index>,
}

impl FingerprintStore {
    /// Store without a backing file
    pub fn in_memory(config: &DedupConfig) -> Self {
        Self {
            scope: config.scope,
            near_duplicate_distance: config.near_duplicate_distance,
            duplicate_title_threshold: config.duplicate_title_threshold,
            path: None,
            index: Mutex::new(Index::default()),
        }
    }

    /// Open the table at `path`, loading every entry already in it.
    ///
    /// A torn final line (crash during append) is skipped with a warning.
    pub fn open(path: &Path, config: &DedupConfig) -> Result<Self, FingerprintError> {
        let mut store = Self::in_memory(config);
        store.path = Some(path.to_path_buf());

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(store),
            Err(e) => return Err(FingerprintError { path: path.to_path_buf(), source: e }),
        };

        let index = store.index.get_mut();
        let mut loaded = 0usize;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| FingerprintError { path: path.to_path_buf(), source: e })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FingerprintEntry>(&line) {
                Ok(entry) => {
                    if index.insert(&entry) {
                        loaded += 1;
                    }
                }
                Err(e) => warn!(path = %path.display(), line = line_no + 1, "Skipping unreadable fingerprint entry: {}", e),
            }
        }
        debug!(path = %path.display(), loaded, "Loaded fingerprint store");
        Ok(store)
    }

    pub fn scope(&self) -> DedupScope {
        self.scope
    }

    fn scope_key<'a>(&self, domain: &'a str) -> &'a str {
        match self.scope {
            DedupScope::Domain => domain,
            DedupScope::Global => GLOBAL_SCOPE,
        }
    }

    /// Fingerprint of `text`
    pub fn fingerprint(&self, text: &str) -> u64 {
        fingerprint(text)
    }

    /// True when `hash` (or, with a near-duplicate distance, a close hash) was
    /// already recorded in the scope of `domain`
    pub fn is_duplicate(&self, domain: &str, hash: u64) -> bool {
        self.seen_in(&self.index.lock(), domain, hash)
    }

    fn seen_in(&self, index: &Index, domain: &str, hash: u64) -> bool {
        let Some(set) = index.hashes.get(self.scope_key(domain)) else {
            return false;
        };
        if set.contains(&hash) {
            return true;
        }
        self.near_duplicate_distance > 0
            && set
                .iter()
                .any(|&seen| hamming_distance(seen, hash) <= self.near_duplicate_distance)
    }

    /// True when the title was already accepted often enough in this scope
    pub fn is_duplicate_title(&self, domain: &str, title: &str) -> bool {
        if self.duplicate_title_threshold == 0 {
            return false;
        }
        let Some(title) = normalize_title(title) else {
            return false;
        };
        let index = self.index.lock();
        index
            .titles
            .get(self.scope_key(domain))
            .and_then(|titles| titles.get(&title))
            .is_some_and(|&count| count >= self.duplicate_title_threshold)
    }

    /// Record an accepted page. The entry is written out by the next `persist`.
    pub fn record(&self, domain: &str, hash: u64, url: &str, title: Option<&str>) {
        let entry = FingerprintEntry {
            scope: self.scope_key(domain).to_string(),
            hash,
            title: title.map(str::to_string),
            url: url.to_string(),
            recorded_at: Utc::now(),
        };
        let mut index = self.index.lock();
        if index.insert(&entry) {
            index.pending.push(entry);
        }
    }

    /// Check and record in one step, so two workers sharing a scope cannot
    /// both accept the same content. Returns false for a duplicate.
    pub fn record_if_new(&self, domain: &str, hash: u64, url: &str, title: Option<&str>) -> bool {
        let mut index = self.index.lock();
        if self.seen_in(&index, domain, hash) {
            return false;
        }
        let entry = FingerprintEntry {
            scope: self.scope_key(domain).to_string(),
            hash,
            title: title.map(str::to_string),
            url: url.to_string(),
            recorded_at: Utc::now(),
        };
        if index.insert(&entry) {
            index.pending.push(entry);
        }
        true
    }

    /// Merge fingerprints restored from a checkpoint that the table may not hold
    pub fn absorb<'a>(&self, domain: &str, hashes: impl IntoIterator<Item = &'a u64>) {
        let scope = self.scope_key(domain).to_string();
        let mut index = self.index.lock();
        let mut added = Vec::new();
        for &hash in hashes {
            if index.hashes.entry(scope.clone()).or_default().insert(hash) {
                added.push(FingerprintEntry {
                    scope: scope.clone(),
                    hash,
                    title: None,
                    url: String::new(),
                    recorded_at: Utc::now(),
                });
            }
        }
        index.pending.extend(added);
    }

    /// Append entries recorded since the last call. Returns how many were written.
    pub fn persist(&self) -> Result<usize, FingerprintError> {
        let Some(path) = &self.path else {
            self.index.lock().pending.clear();
            return Ok(0);
        };
        let pending = std::mem::take(&mut self.index.lock().pending);
        if pending.is_empty() {
            return Ok(0);
        }

        let io_err = |e: std::io::Error| FingerprintError { path: path.clone(), source: e };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = open_line_log(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        for entry in &pending {
            let line = serde_json::to_string(entry)
                .map_err(|e| io_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
            writeln!(writer, "{}", line).map_err(io_err)?;
        }
        let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        file.sync_all().map_err(io_err)?;
        Ok(pending.len())
    }

    /// Total fingerprints across every scope
    pub fn len(&self) -> usize {
        self.index.lock().hashes.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
