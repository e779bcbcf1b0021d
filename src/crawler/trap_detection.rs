//! Crawl trap detection
//!
//! Generated URL spaces (calendars, recursive relative links, faceted query
//! strings) never run dry; these checks keep them out of the frontier.

use url::Url;

/// Kind of trap a URL looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapKind {
    TooLong,
    TooDeep,
    RepeatedSegments,
    Calendar,
    QueryExplosion,
}

#[derive(Debug, Clone)]
pub struct TrapDetector {
    max_url_length: usize,
    max_path_depth: usize,
    max_repeated_segments: usize,
    max_query_params: usize,
}

impl TrapDetector {
    pub fn new(max_url_length: usize) -> Self {
        Self {
            max_url_length,
            max_path_depth: 15,
            max_repeated_segments: 3,
            max_query_params: 8,
        }
    }

    pub fn detect(&self, url: &Url) -> Option<TrapKind> {
        if url.as_str().len() > self.max_url_length {
            return Some(TrapKind::TooLong);
        }

        let segments: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() > self.max_path_depth {
            return Some(TrapKind::TooDeep);
        }
        if has_repeated_segments(&segments, self.max_repeated_segments) {
            return Some(TrapKind::RepeatedSegments);
        }
        if is_calendar_path(&segments) {
            return Some(TrapKind::Calendar);
        }
        if url.query_pairs().count() > self.max_query_params {
            return Some(TrapKind::QueryExplosion);
        }
        None
    }
}

// Same segment, or same run of segments, recurring at a fixed stride
fn has_repeated_segments(segments: &[&str], max_repeats: usize) -> bool {
    if segments.len() < 4 {
        return false;
    }
    for stride in 1..=segments.len() / 2 {
        let repeats = (0..segments.len() - stride)
            .filter(|&i| segments[i] == segments[i + stride])
            .count();
        if repeats >= max_repeats {
            return true;
        }
    }
    false
}

// Three consecutive numeric segments, e.g. /2024/01/02
fn is_calendar_path(segments: &[&str]) -> bool {
    segments
        .windows(3)
        .any(|w| w.iter().all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(raw: &str) -> Option<TrapKind> {
        TrapDetector::new(2048).detect(&Url::parse(raw).unwrap())
    }

    #[test]
    fn test_documentation_urls_pass() {
        assert_eq!(detect("https://docs.python.org/3/library/os.path.html"), None);
        assert_eq!(detect("https://example.com/guide/v1/setup"), None);
    }

    #[test]
    fn test_deep_path() {
        assert_eq!(
            detect("https://example.com/a/b/c/d/e/f/g/h/i/j/k/l/m/n/o/p"),
            Some(TrapKind::TooDeep)
        );
    }

    #[test]
    fn test_long_url() {
        let url = Url::parse(&format!("https://example.com/{}", "x".repeat(100))).unwrap();
        assert_eq!(TrapDetector::new(64).detect(&url), Some(TrapKind::TooLong));
    }

    #[test]
    fn test_repeated_segments() {
        assert_eq!(
            detect("https://example.com/docs/api/docs/api/docs/api/docs"),
            Some(TrapKind::RepeatedSegments)
        );
    }

    #[test]
    fn test_calendar() {
        assert_eq!(detect("https://example.com/events/2024/01/15"), Some(TrapKind::Calendar));
        assert_eq!(detect("https://example.com/3/library/2024"), None);
    }

    #[test]
    fn test_query_explosion() {
        assert_eq!(
            detect("https://example.com/list?a=1&b=2&c=3&d=4&e=5&f=6&g=7&h=8&i=9"),
            Some(TrapKind::QueryExplosion)
        );
    }
}
