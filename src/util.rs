//! Shared utility functions

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

/// Truncate a string to a maximum length, appending "..." if truncated.
/// Handles multi-byte characters by finding a valid char boundary.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let suffix = "...";
    let target = max_len.saturating_sub(suffix.len());
    let mut end = target;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], suffix)
}

/// Stable 64-bit hash, identical across runs and platforms
pub fn fast_hash(s: &str) -> u64 {
    xxh3_64(s.as_bytes())
}

/// 64-bit SimHash over pre-extracted features.
///
/// Every feature votes on each bit of its hash; a bit is set when more
/// features voted for it than against.
pub fn compute_simhash<'a>(features: impl IntoIterator<Item = &'a str>) -> u64 {
    let mut weights = [0i32; 64];
    let mut any = false;
    for feature in features {
        any = true;
        let hash = fast_hash(feature);
        for (bit, weight) in weights.iter_mut().enumerate() {
            if hash >> bit & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }
    if !any {
        return 0;
    }
    weights
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0)
        .fold(0u64, |acc, (bit, _)| acc | 1 << bit)
}

/// Open a line-oriented log for appending.
///
/// A crash can leave the last line half written. A newline is added after it
/// so the next line starts clean; readers skip the torn fragment.
pub fn open_line_log(path: &Path) -> std::io::Result<File> {
    let mut file = OpenOptions::new().read(true).append(true).create(true).open(path)?;
    let len = file.metadata()?.len();
    if len > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            file.write_all(b"\n")?;
        }
    }
    Ok(file)
}
