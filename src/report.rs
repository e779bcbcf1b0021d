//! Quality report over a crawl output file

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::types::PageRecord;

/// Score buckets used in the report, lower bound inclusive
const QUALITY_RANGES: &[(f32, f32, &str)] = &[
    (0.0, 40.0, "0-40"),
    (40.0, 60.0, "40-60"),
    (60.0, 80.0, "60-80"),
    (80.0, f32::INFINITY, "80-100"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomainReport {
    pub pages: usize,
    pub words: usize,
    pub avg_quality: f32,
    pub min_quality: f32,
    pub max_quality: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityReport {
    pub total_pages: usize,
    pub total_words: usize,
    pub avg_quality: f32,
    /// Records sharing a content hash with an earlier record
    pub duplicate_hashes: usize,
    pub domains: BTreeMap<String, DomainReport>,
    pub quality_ranges: BTreeMap<String, usize>,
    pub languages: BTreeMap<String, usize>,
    pub content_types: BTreeMap<String, usize>,
    pub categories: BTreeMap<String, usize>,
}

impl QualityReport {
    pub fn build(records: &[PageRecord]) -> Self {
        let mut report = QualityReport {
            total_pages: records.len(),
            ..Default::default()
        };
        for (_, _, label) in QUALITY_RANGES {
            report.quality_ranges.insert(label.to_string(), 0);
        }
        if records.is_empty() {
            return report;
        }

        let mut seen = HashSet::new();
        let mut score_sum = 0.0f64;
        for record in records {
            report.total_words += record.word_count;
            score_sum += record.quality_score as f64;
            if !seen.insert(record.content_hash) {
                report.duplicate_hashes += 1;
            }

            let domain = report.domains.entry(record.domain.clone()).or_insert_with(|| DomainReport {
                min_quality: f32::MAX,
                ..Default::default()
            });
            domain.pages += 1;
            domain.words += record.word_count;
            domain.avg_quality += record.quality_score;
            domain.min_quality = domain.min_quality.min(record.quality_score);
            domain.max_quality = domain.max_quality.max(record.quality_score);

            if let Some((_, _, label)) = QUALITY_RANGES
                .iter()
                .find(|(lo, hi, _)| record.quality_score >= *lo && record.quality_score < *hi)
            {
                *report.quality_ranges.entry(label.to_string()).or_default() += 1;
            }
            let language = record.language.clone().unwrap_or_else(|| "unknown".to_string());
            *report.languages.entry(language).or_default() += 1;
            *report.content_types.entry(record.content_type.clone()).or_default() += 1;
            *report.categories.entry(record.category.clone()).or_default() += 1;
        }

        for domain in report.domains.values_mut() {
            domain.avg_quality = round1(domain.avg_quality / domain.pages as f32);
        }
        report.avg_quality = round1((score_sum / records.len() as f64) as f32);
        report
    }
}

fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(domain: &str, score: f32, hash: u64, language: Option<&str>, kind: &str) -> PageRecord {
        PageRecord {
            url: format!("https://{}/{}", domain, hash),
            domain: domain.to_string(),
            title: "Page".to_string(),
            content: "text".to_string(),
            word_count: 100,
            quality_score: score,
            language: language.map(str::to_string),
            content_hash: hash,
            fetched_at: Utc::now(),
            http_status: 200,
            category: "docs".to_string(),
            content_type: kind.to_string(),
            depth: 1,
        }
    }

    #[test]
    fn test_empty_report() {
        let report = QualityReport::build(&[]);
        assert_eq!(report.total_pages, 0);
        assert_eq!(report.quality_ranges.len(), 4);
        assert!(report.domains.is_empty());
    }

    #[test]
    fn test_breakdown() {
        let records = vec![
            record("a.test", 50.0, 1, Some("en"), "guide"),
            record("a.test", 70.0, 2, Some("en"), "tutorial"),
            record("b.test", 90.0, 3, None, "guide"),
            record("b.test", 30.0, 3, Some("de"), "reference"),
        ];
        let report = QualityReport::build(&records);

        assert_eq!(report.total_pages, 4);
        assert_eq!(report.total_words, 400);
        assert_eq!(report.avg_quality, 60.0);
        assert_eq!(report.duplicate_hashes, 1);

        let a = &report.domains["a.test"];
        assert_eq!(a.pages, 2);
        assert_eq!(a.avg_quality, 60.0);
        assert_eq!(a.min_quality, 50.0);
        assert_eq!(a.max_quality, 70.0);

        assert_eq!(report.quality_ranges["0-40"], 1);
        assert_eq!(report.quality_ranges["40-60"], 1);
        assert_eq!(report.quality_ranges["60-80"], 1);
        assert_eq!(report.quality_ranges["80-100"], 1);
        assert_eq!(report.languages["en"], 2);
        assert_eq!(report.languages["unknown"], 1);
        assert_eq!(report.content_types["guide"], 2);
    }
}
