//! URL normalization and crawl filtering
//!
//! `normalize` turns any discovered href into the canonical form used as the
//! visited-set key, and `UrlFilter` decides whether a canonical URL is worth
//! fetching for a given domain. Both are pure: the same input always yields
//! the same answer, which is what keeps the visited set and fingerprints
//! consistent across a resume.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

use super::trap_detection::{TrapDetector, TrapKind};
use crate::config::{CrawlConfig, DomainPlan};

/// Tracking and session query parameters stripped during normalization
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "_ga", "_gl", "yclid", "sid",
    "sessionid", "ref", "source",
];

/// Extensions that never hold documentation text
const NON_DOCUMENT_EXTENSIONS: &[&str] = &[
    "zip", "gz", "tgz", "tar", "bz2", "xz", "7z", "rar", "pdf", "png", "jpg", "jpeg", "gif",
    "webp", "bmp", "ico", "svg", "css", "js", "mjs", "map", "xml", "rss", "atom", "json", "mp4",
    "mp3", "avi", "mov", "webm", "wav", "woff", "woff2", "ttf", "otf", "eot", "exe", "dmg", "msi",
    "deb", "rpm", "whl", "jar", "iso", "bin",
];

/// Path segments that mark account, commerce or legal pages
const NEGATIVE_SEGMENTS: &[&str] = &[
    "login", "signin", "sign-in", "signup", "sign-up", "register", "logout", "cart", "checkout",
    "careers", "jobs", "pricing", "privacy", "terms", "cookies", "legal", "advertise", "sponsors",
    "press", "search",
];

/// Keywords of hands-on material, crawled first
const HIGH_PRIORITY_KEYWORDS: &[&str] = &[
    "tutorial", "guide", "example", "getting-started", "getting_started", "quickstart", "howto",
    "how-to", "learn", "cookbook",
];

/// Keywords of reference material
const MEDIUM_PRIORITY_KEYWORDS: &[&str] =
    &["docs", "doc", "documentation", "reference", "api", "manual", "library", "handbook"];

/// Why a raw URL could not be normalized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlRejection {
    #[error("unparseable URL '{0}'")]
    Unparseable(String),

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("URL too long ({0} bytes)")]
    TooLong(usize),
}

/// A URL in canonical form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Host without the `www.` prefix
    pub fn domain(&self) -> &str {
        let host = self.0.host_str().unwrap_or_default();
        host.strip_prefix("www.").unwrap_or(host)
    }

    /// Wrap a URL that is already canonical, e.g. one read back from a checkpoint
    pub(crate) fn from_canonical(url: Url) -> Self {
        Self(url)
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Domain key for a URL: lowercase host without `www.`
pub fn domain_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Normalize `raw` (absolute, or relative to `base`) into canonical form.
///
/// - Resolves relative references against `base`
/// - Lowercases scheme and host, drops default ports
/// - Drops the fragment and tracking parameters, sorts the rest of the query
/// - Collapses duplicate slashes and strips the trailing slash of non-root paths
/// - Rejects non-http(s) URLs and URLs longer than `max_len`
pub fn normalize(raw: &str, base: Option<&Url>, max_len: usize) -> Result<NormalizedUrl, UrlRejection> {
    let raw = raw.trim();
    let parsed = match base {
        Some(base) => base.join(raw),
        None => Url::parse(raw),
    };
    let mut url = parsed.map_err(|_| UrlRejection::Unparseable(raw.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlRejection::UnsupportedScheme(url.scheme().to_string()));
    }
    // The parser already lowercases the host; `www.` is kept so the URL
    // still names the host that was linked
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlRejection::MissingHost);
    }

    url.set_fragment(None);
    let _ = url.set_username("");
    let _ = url.set_password(None);

    let path = canonical_path(url.path());
    if path != url.path() {
        url.set_path(&path);
    }

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !is_tracking_param(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if params.is_empty() {
            url.set_query(None);
        } else {
            params.sort();
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    let len = url.as_str().len();
    if len > max_len {
        return Err(UrlRejection::TooLong(len));
    }
    Ok(NormalizedUrl(url))
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

fn canonical_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Why a normalized URL was filtered out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    OffDomain,
    OutsidePrefix,
    Excluded,
    NotIncluded,
    NonDocument,
    NegativeKeyword,
    NotDocumentation,
    Trap(TrapKind),
}

/// Per-domain URL filter, compiled once from the domain plan
#[derive(Debug, Clone)]
pub struct UrlFilter {
    domain: String,
    allowed_prefixes: Vec<String>,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    require_doc_keywords: bool,
    traps: TrapDetector,
    max_url_length: usize,
}

impl UrlFilter {
    pub fn new(plan: &DomainPlan, crawl: &CrawlConfig) -> Result<Self, regex::Error> {
        let include = crawl
            .include_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude = crawl
            .exclude_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            domain: plan.domain.clone(),
            allowed_prefixes: plan.allowed_prefixes.clone(),
            include,
            exclude,
            require_doc_keywords: crawl.require_doc_keywords,
            traps: TrapDetector::new(crawl.max_url_length),
            max_url_length: crawl.max_url_length,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn max_url_length(&self) -> usize {
        self.max_url_length
    }

    /// True when the URL should be crawled
    pub fn filter(&self, url: &NormalizedUrl) -> bool {
        self.rejection_reason(url).is_none()
    }

    pub fn rejection_reason(&self, url: &NormalizedUrl) -> Option<FilterReason> {
        if url.domain() != self.domain {
            return Some(FilterReason::OffDomain);
        }

        let path = url.as_url().path();
        if !self.allowed_prefixes.is_empty()
            && !self.allowed_prefixes.iter().any(|p| path.starts_with(p.as_str()) || prefix_matches_dir(path, p))
        {
            return Some(FilterReason::OutsidePrefix);
        }

        if has_non_document_extension(path) {
            return Some(FilterReason::NonDocument);
        }

        let lower_path = path.to_ascii_lowercase();
        if lower_path
            .split('/')
            .any(|seg| NEGATIVE_SEGMENTS.iter().any(|neg| segment_matches(seg, neg)))
        {
            return Some(FilterReason::NegativeKeyword);
        }

        if let Some(kind) = self.traps.detect(url.as_url()) {
            return Some(FilterReason::Trap(kind));
        }

        let as_str = url.as_str();
        if self.exclude.iter().any(|p| p.is_match(as_str)) {
            return Some(FilterReason::Excluded);
        }
        if !self.include.is_empty() && !self.include.iter().any(|p| p.is_match(as_str)) {
            return Some(FilterReason::NotIncluded);
        }

        if self.require_doc_keywords && keyword_tier(url) == KeywordTier::None {
            return Some(FilterReason::NotDocumentation);
        }

        None
    }
}

// `/docs/` as a prefix also admits `/docs` itself, which normalization produces
fn prefix_matches_dir(path: &str, prefix: &str) -> bool {
    prefix.len() > 1 && prefix.ends_with('/') && path == &prefix[..prefix.len() - 1]
}

fn segment_matches(segment: &str, keyword: &str) -> bool {
    let stem = segment.split('.').next().unwrap_or(segment);
    stem == keyword
}

fn has_non_document_extension(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((_, ext)) => NON_DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeywordTier {
    High,
    Medium,
    None,
}

fn keyword_tier(url: &NormalizedUrl) -> KeywordTier {
    let host = url.domain().to_ascii_lowercase();
    let path = url.as_url().path().to_ascii_lowercase();
    let contains_word = |text: &str, kw: &str| {
        text.split(['/', '.']).any(|part| match part.strip_prefix(kw) {
            Some(rest) => rest.is_empty() || rest == "s" || rest.starts_with(['-', '_']),
            None => false,
        })
    };

    if HIGH_PRIORITY_KEYWORDS.iter().any(|kw| contains_word(&path, kw)) {
        KeywordTier::High
    } else if MEDIUM_PRIORITY_KEYWORDS
        .iter()
        .any(|kw| contains_word(&path, kw) || contains_word(&host, kw))
    {
        KeywordTier::Medium
    } else {
        KeywordTier::None
    }
}

/// Frontier priority of a URL found at `depth`.
///
/// Tutorials and guides outrank reference pages, which outrank everything
/// else; each level of depth costs a tenth.
pub fn url_priority(url: &NormalizedUrl, depth: u8) -> f32 {
    let base = match keyword_tier(url) {
        KeywordTier::High => 1.5,
        KeywordTier::Medium => 1.25,
        KeywordTier::None => 1.0,
    };
    (base - 0.1 * depth as f32).max(0.0)
}
