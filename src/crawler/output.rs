//! JSONL crawl output
//!
//! Accepted records are buffered in memory and appended to `crawled.jsonl`
//! only when the orchestrator flushes, at a checkpoint or at shutdown, so the
//! file never runs ahead of the last saved snapshot.

use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::PageRecord;
use crate::util::open_line_log;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("crawl output I/O on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize page record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only record sink shared by every worker
#[derive(Debug)]
pub struct CrawlOutput {
    path: PathBuf,
    pending: Mutex<Vec<PageRecord>>,
    written: AtomicU64,
}

impl CrawlOutput {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            pending: Mutex::new(Vec::new()),
            written: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer an accepted record until the next flush
    pub fn push(&self, record: PageRecord) {
        self.pending.lock().push(record);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Records written by this process
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Append buffered records and sync the file. Returns how many were written.
    pub fn flush(&self) -> Result<usize, OutputError> {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return Ok(0);
        }

        let io_err = |e: std::io::Error| OutputError::Io { path: self.path.clone(), source: e };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = open_line_log(&self.path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        for record in &pending {
            let line = serde_json::to_string(record)?;
            writeln!(writer, "{}", line).map_err(io_err)?;
        }
        let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        file.sync_all().map_err(io_err)?;

        self.written.fetch_add(pending.len() as u64, Ordering::Relaxed);
        debug!(path = %self.path.display(), records = pending.len(), "Flushed crawl output");
        Ok(pending.len())
    }
}

/// Read every record from a crawl output file, skipping unreadable lines
pub fn read_records(path: &Path) -> Result<Vec<PageRecord>, OutputError> {
    let io_err = |e: std::io::Error| OutputError::Io { path: path.to_path_buf(), source: e };
    let file = File::open(path).map_err(io_err)?;

    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PageRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), line = line_no + 1, "Skipping unreadable record: {}", e),
        }
    }
    Ok(records)
}
