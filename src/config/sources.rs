//! Crawl sources and their per-domain merge

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use super::{CrawlConfig, QualityConfig};
use crate::crawler::url_filter::domain_key;

/// One configured documentation source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Primary seed URL
    #[serde(default)]
    pub url: Option<String>,
    /// Additional seed URLs
    #[serde(default)]
    pub seeds: Vec<String>,
    /// Free-form grouping carried into every page record
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub quality_threshold: Option<f32>,
    #[serde(default)]
    pub max_depth: Option<u8>,
    #[serde(default)]
    pub allowed_languages: Option<Vec<String>>,
    /// Path prefixes the crawl is confined to; empty allows the whole domain
    #[serde(default)]
    pub allowed_prefixes: Vec<String>,
    /// Lower values are scheduled first
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_category() -> String {
    "docs".to_string()
}

fn default_priority() -> u32 {
    1
}

impl SourceConfig {
    pub fn from_url(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            seeds: Vec::new(),
            category: default_category(),
            max_pages: None,
            quality_threshold: None,
            max_depth: None,
            allowed_languages: None,
            allowed_prefixes: Vec::new(),
            priority: default_priority(),
        }
    }

    /// All seed strings, primary URL first
    pub fn seed_strings(&self) -> impl Iterator<Item = &str> {
        self.url.iter().map(String::as_str).chain(self.seeds.iter().map(String::as_str))
    }
}

/// Everything a domain worker needs to know about its domain, after merging
/// every source that points at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainPlan {
    pub domain: String,
    pub seeds: Vec<Url>,
    pub category: String,
    pub max_pages: usize,
    pub quality_threshold: f32,
    pub max_depth: u8,
    pub allowed_languages: Vec<String>,
    pub allowed_prefixes: Vec<String>,
    pub priority: u32,
}

/// Merge sources by domain.
///
/// Seeds and prefixes are unioned and page budgets are summed. The lowest
/// quality threshold wins since it admits the most pages. The lowest max depth
/// wins too, which is the most restrictive choice. Priority takes the lowest
/// (most urgent) value. Plans come back ordered by priority, then domain.
pub fn merge_sources(
    sources: &[SourceConfig],
    crawl: &CrawlConfig,
    quality: &QualityConfig,
) -> Result<Vec<DomainPlan>> {
    let mut plans: BTreeMap<String, DomainPlan> = BTreeMap::new();

    for source in sources {
        let mut seeds = Vec::new();
        for raw in source.seed_strings() {
            let url = Url::parse(raw).map_err(|e| anyhow::anyhow!("Invalid seed URL '{}': {}", raw, e))?;
            seeds.push(url);
        }
        let Some(first) = seeds.first() else {
            bail!("Source in category '{}' has no seed URL", source.category);
        };
        let Some(domain) = domain_key(first) else {
            bail!("Seed URL '{}' has no host", first);
        };
        if let Some(other) = seeds.iter().find(|s| domain_key(s).as_deref() != Some(domain.as_str())) {
            bail!("Seed URL '{}' is not on domain '{}'", other, domain);
        }

        let max_pages = source.max_pages.unwrap_or(crawl.default_max_pages);
        let threshold = source.quality_threshold.unwrap_or(quality.threshold);
        let depth = source.max_depth.unwrap_or(crawl.default_max_depth);
        let languages = source
            .allowed_languages
            .clone()
            .unwrap_or_else(|| quality.allowed_languages.clone());

        match plans.get_mut(&domain) {
            Some(plan) => {
                for seed in seeds {
                    if !plan.seeds.contains(&seed) {
                        plan.seeds.push(seed);
                    }
                }
                plan.max_pages = plan.max_pages.saturating_add(max_pages);
                plan.quality_threshold = plan.quality_threshold.min(threshold);
                plan.max_depth = plan.max_depth.min(depth);
                plan.priority = plan.priority.min(source.priority);
                // An unrestricted source opens the whole domain
                if plan.allowed_prefixes.is_empty() || source.allowed_prefixes.is_empty() {
                    plan.allowed_prefixes.clear();
                } else {
                    for prefix in &source.allowed_prefixes {
                        if !plan.allowed_prefixes.contains(prefix) {
                            plan.allowed_prefixes.push(prefix.clone());
                        }
                    }
                }
                for lang in languages {
                    if !plan.allowed_languages.contains(&lang) {
                        plan.allowed_languages.push(lang);
                    }
                }
            }
            None => {
                plans.insert(
                    domain.clone(),
                    DomainPlan {
                        domain,
                        seeds,
                        category: source.category.clone(),
                        max_pages,
                        quality_threshold: threshold,
                        max_depth: depth,
                        allowed_languages: languages,
                        allowed_prefixes: source.allowed_prefixes.clone(),
                        priority: source.priority,
                    },
                );
            }
        }
    }

    let mut plans: Vec<DomainPlan> = plans.into_values().collect();
    plans.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.domain.cmp(&b.domain)));
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str, max_pages: usize, threshold: f32, priority: u32) -> SourceConfig {
        SourceConfig {
            max_pages: Some(max_pages),
            quality_threshold: Some(threshold),
            priority,
            ..SourceConfig::from_url(url)
        }
    }

    #[test]
    fn test_merge_same_domain() {
        let sources = vec![
            source("https://docs.example.com/guide/", 100, 50.0, 2),
            source("https://docs.example.com/api/", 200, 40.0, 1),
        ];
        let plans = merge_sources(&sources, &CrawlConfig::default(), &QualityConfig::default()).unwrap();

        assert_eq!(plans.len(), 1);
        let plan = &plans[0];
        assert_eq!(plan.domain, "docs.example.com");
        assert_eq!(plan.seeds.len(), 2);
        assert_eq!(plan.max_pages, 300);
        assert_eq!(plan.quality_threshold, 40.0);
        assert_eq!(plan.priority, 1);
    }

    #[test]
    fn test_shallowest_depth_wins() {
        let sources = vec![
            SourceConfig { max_depth: Some(6), ..source("https://docs.example.com/guide/", 10, 45.0, 1) },
            SourceConfig { max_depth: Some(2), ..source("https://docs.example.com/api/", 10, 45.0, 1) },
        ];
        let plans = merge_sources(&sources, &CrawlConfig::default(), &QualityConfig::default()).unwrap();
        assert_eq!(plans[0].max_depth, 2);
    }

    #[test]
    fn test_www_collapses_into_one_domain() {
        let sources = vec![
            source("https://www.example.com/a", 10, 45.0, 1),
            source("https://example.com/b", 10, 45.0, 1),
        ];
        let plans = merge_sources(&sources, &CrawlConfig::default(), &QualityConfig::default()).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].domain, "example.com");
    }

    #[test]
    fn test_plans_ordered_by_priority() {
        let sources = vec![
            source("https://b.example.com/", 10, 45.0, 3),
            source("https://a.example.com/", 10, 45.0, 1),
            source("https://c.example.com/", 10, 45.0, 2),
        ];
        let plans = merge_sources(&sources, &CrawlConfig::default(), &QualityConfig::default()).unwrap();
        let domains: Vec<_> = plans.iter().map(|p| p.domain.as_str()).collect();
        assert_eq!(domains, vec!["a.example.com", "c.example.com", "b.example.com"]);
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let sources = vec![SourceConfig::from_url("https://example.com/")];
        let crawl = CrawlConfig::default();
        let quality = QualityConfig::default();
        let plans = merge_sources(&sources, &crawl, &quality).unwrap();
        assert_eq!(plans[0].max_pages, crawl.default_max_pages);
        assert_eq!(plans[0].quality_threshold, quality.threshold);
        assert_eq!(plans[0].allowed_languages, vec!["en".to_string()]);
    }

    #[test]
    fn test_unrestricted_source_clears_prefixes() {
        let mut narrow = SourceConfig::from_url("https://example.com/docs/");
        narrow.allowed_prefixes = vec!["/docs/".to_string()];
        let wide = SourceConfig::from_url("https://example.com/");
        let plans = merge_sources(&[narrow, wide], &CrawlConfig::default(), &QualityConfig::default()).unwrap();
        assert!(plans[0].allowed_prefixes.is_empty());
    }

    #[test]
    fn test_rejects_source_without_seed() {
        let mut empty = SourceConfig::from_url("https://example.com/");
        empty.url = None;
        assert!(merge_sources(&[empty], &CrawlConfig::default(), &QualityConfig::default()).is_err());
    }

    #[test]
    fn test_rejects_cross_domain_seeds() {
        let mut mixed = SourceConfig::from_url("https://example.com/");
        mixed.seeds = vec!["https://other.org/".to_string()];
        assert!(merge_sources(&[mixed], &CrawlConfig::default(), &QualityConfig::default()).is_err());
    }
}
