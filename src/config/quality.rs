//! Quality gate and deduplication configuration

use serde::{Deserialize, Serialize};

/// Acceptance policy applied to extracted pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum score (0-100) for a page to be accepted
    pub threshold: f32,
    /// Pages with fewer words are rejected as too short
    pub min_word_count: usize,
    /// Pages with fewer characters are rejected as too short
    pub min_char_count: usize,
    /// Pages whose boilerplate ratio exceeds this are rejected
    pub max_boilerplate_ratio: f32,
    /// ISO 639-1 codes accepted; empty accepts any language
    pub allowed_languages: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            threshold: 45.0,
            min_word_count: 50,
            min_char_count: 150,
            max_boilerplate_ratio: 0.25,
            allowed_languages: vec!["en".to_string()],
        }
    }
}

/// Where content fingerprints are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    /// Each domain has its own fingerprint set
    #[default]
    Domain,
    /// One fingerprint set shared by every domain
    Global,
}

/// Content deduplication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub scope: DedupScope,
    /// SimHash Hamming distance still counted as a duplicate (0 = exact only)
    pub near_duplicate_distance: u32,
    /// Identical titles allowed per scope before further pages are duplicates (0 disables)
    pub duplicate_title_threshold: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            scope: DedupScope::Domain,
            near_duplicate_distance: 3,
            duplicate_title_threshold: 5,
        }
    }
}
