//! Configuration for doccrawl

mod crawl;
mod logging;
mod quality;
mod sources;

pub use crawl::{CheckpointConfig, CrawlConfig, PolitenessConfig, StalePolicy};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use quality::{DedupConfig, DedupScope, QualityConfig};
pub use sources::{merge_sources, DomainPlan, SourceConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default user agent for every request, robots.txt matching included
pub const DEFAULT_USER_AGENT: &str = "DocCrawlBot/0.1 (+https://github.com/doccrawl/doccrawl)";

/// Main crawl configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Crawl-wide settings
    #[serde(default)]
    pub crawl: CrawlConfig,
    /// Rate limiting and backoff
    #[serde(default)]
    pub politeness: PolitenessConfig,
    /// Acceptance policy
    #[serde(default)]
    pub quality: QualityConfig,
    /// Content deduplication
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Checkpoint cadence and stale handling
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Documentation sources to crawl
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Command-line overrides applied on top of the file
#[derive(Debug, Clone, Default)]
pub struct CrawlOverrides {
    pub quality_threshold: Option<f32>,
    pub max_pages: Option<usize>,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without validating it. Commands that only touch the
    /// data directory do not need any sources.
    pub fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))
    }

    /// Apply command-line overrides, then re-validate.
    ///
    /// A threshold or page budget given on the command line wins over every
    /// per-source value.
    pub fn apply_overrides(&mut self, overrides: &CrawlOverrides) -> Result<()> {
        if let Some(threshold) = overrides.quality_threshold {
            self.quality.threshold = threshold;
            for source in &mut self.sources {
                source.quality_threshold = Some(threshold);
            }
        }
        if let Some(max_pages) = overrides.max_pages {
            self.crawl.default_max_pages = max_pages;
            for source in &mut self.sources {
                source.max_pages = Some(max_pages);
            }
        }
        if let Some(dir) = &overrides.data_dir {
            self.crawl.data_dir = dir.clone();
        }
        self.validate()
    }

    /// Sources merged into one plan per domain
    pub fn domain_plans(&self) -> Result<Vec<DomainPlan>> {
        merge_sources(&self.sources, &self.crawl, &self.quality)
    }

    /// Validate all configuration fields.
    ///
    /// Collects every problem and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Crawl validation
        if self.crawl.data_dir.as_os_str().is_empty() {
            errors.push("data_dir must not be empty".to_string());
        }
        if self.crawl.output_file.trim().is_empty() {
            errors.push("output_file must not be empty".to_string());
        }
        if self.crawl.max_concurrent_fetches == 0 {
            errors.push("max_concurrent_fetches must be positive".to_string());
        }
        if self.crawl.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be positive".to_string());
        }
        if self.crawl.max_body_bytes == 0 {
            errors.push("max_body_bytes must be positive".to_string());
        }
        if self.crawl.max_consecutive_failures == 0 {
            errors.push("max_consecutive_failures must be positive".to_string());
        }
        if self.crawl.max_url_length < 16 {
            errors.push("max_url_length must be at least 16".to_string());
        }
        for pattern in self.crawl.include_patterns.iter().chain(&self.crawl.exclude_patterns) {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(format!("invalid URL pattern '{}': {}", pattern, e));
            }
        }

        // Politeness validation
        if self.politeness.user_agent.trim().is_empty() {
            errors.push("user_agent must not be empty".to_string());
        }
        if self.politeness.max_delay_ms < self.politeness.default_delay_ms {
            errors.push("max_delay_ms must be >= default_delay_ms".to_string());
        }
        if self.politeness.max_backoff_ms < self.politeness.backoff_base_ms {
            errors.push("max_backoff_ms must be >= backoff_base_ms".to_string());
        }
        if self.politeness.reset_after_successes == 0 {
            errors.push("reset_after_successes must be positive".to_string());
        }
        if !(0.0..=10.0).contains(&self.politeness.latency_factor) {
            errors.push("latency_factor must be between 0.0 and 10.0".to_string());
        }

        // Quality validation
        if !(0.0..=100.0).contains(&self.quality.threshold) {
            errors.push("quality threshold must be between 0 and 100".to_string());
        }
        if !(0.0..=1.0).contains(&self.quality.max_boilerplate_ratio) {
            errors.push("max_boilerplate_ratio must be between 0.0 and 1.0".to_string());
        }

        // Checkpoint validation
        if self.checkpoint.interval_secs == 0 {
            errors.push("checkpoint interval_secs must be positive".to_string());
        }

        // Source validation
        if self.sources.is_empty() {
            errors.push("at least one [[sources]] entry is required".to_string());
        }
        for (i, source) in self.sources.iter().enumerate() {
            if source.seed_strings().next().is_none() {
                errors.push(format!("source #{} needs a url or seeds", i + 1));
            }
            for raw in source.seed_strings() {
                match url::Url::parse(raw) {
                    Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                    Ok(_) => errors.push(format!("source #{} seed '{}' must be http or https", i + 1, raw)),
                    Err(e) => errors.push(format!("source #{} seed '{}' is invalid: {}", i + 1, raw, e)),
                }
            }
            if let Some(threshold) = source.quality_threshold {
                if !(0.0..=100.0).contains(&threshold) {
                    errors.push(format!("source #{} quality_threshold must be between 0 and 100", i + 1));
                }
            }
            if source.max_pages == Some(0) {
                errors.push(format!("source #{} max_pages must be positive", i + 1));
            }
        }
        if self.crawl.default_max_pages == 0 {
            errors.push("default_max_pages must be positive".to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration validation failed:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Helper: build a valid config for mutation-based testing
    // ========================================================================

    fn valid_config() -> Config {
        Config {
            sources: vec![SourceConfig::from_url("https://docs.example.com/")],
            ..Config::default()
        }
    }

    // ========================================================================
    // Config::validate – happy path
    // ========================================================================

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_requires_sources() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("at least one [[sources]] entry"));
    }

    // ========================================================================
    // Config::validate – crawl and politeness errors
    // ========================================================================

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut cfg = valid_config();
        cfg.crawl.max_concurrent_fetches = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_fetches must be positive"));
    }

    #[test]
    fn validate_rejects_bad_pattern() {
        let mut cfg = valid_config();
        cfg.crawl.exclude_patterns = vec!["([".to_string()];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("invalid URL pattern"));
    }

    #[test]
    fn validate_rejects_inverted_delays() {
        let mut cfg = valid_config();
        cfg.politeness.default_delay_ms = 5_000;
        cfg.politeness.max_delay_ms = 1_000;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_delay_ms must be >= default_delay_ms"));
    }

    // ========================================================================
    // Config::validate – quality and sources
    // ========================================================================

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut cfg = valid_config();
        cfg.quality.threshold = 120.0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("quality threshold must be between 0 and 100"));
    }

    #[test]
    fn validate_rejects_non_http_seed() {
        let mut cfg = valid_config();
        cfg.sources.push(SourceConfig::from_url("ftp://example.com/"));
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("must be http or https"));
    }

    #[test]
    fn validate_reports_all_errors_together() {
        let mut cfg = valid_config();
        cfg.crawl.max_concurrent_fetches = 0;
        cfg.quality.threshold = -1.0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("max_concurrent_fetches"));
        assert!(msg.contains("quality threshold"));
    }

    // ========================================================================
    // Loading and overrides
    // ========================================================================

    #[test]
    fn load_parses_toml_with_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("doccrawl.toml");
        std::fs::write(
            &path,
            r#"
[quality]
threshold = 50.0

[dedup]
scope = "global"

[[sources]]
url = "https://docs.python.org/3/"
category = "python"
max_pages = 20
"#,
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.quality.threshold, 50.0);
        assert_eq!(cfg.dedup.scope, DedupScope::Global);
        assert_eq!(cfg.crawl.max_concurrent_fetches, CrawlConfig::default().max_concurrent_fetches);
        assert_eq!(cfg.sources[0].category, "python");
        assert_eq!(cfg.sources[0].max_pages, Some(20));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/doccrawl.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn overrides_win_over_sources() {
        let mut cfg = valid_config();
        cfg.sources[0].quality_threshold = Some(30.0);
        cfg.apply_overrides(&CrawlOverrides {
            quality_threshold: Some(60.0),
            max_pages: Some(5),
            data_dir: Some(PathBuf::from("/tmp/crawl")),
        })
        .unwrap();

        let plans = cfg.domain_plans().unwrap();
        assert_eq!(plans[0].quality_threshold, 60.0);
        assert_eq!(plans[0].max_pages, 5);
        assert_eq!(cfg.crawl.data_dir, PathBuf::from("/tmp/crawl"));
    }

    #[test]
    fn overrides_are_validated() {
        let mut cfg = valid_config();
        let result = cfg.apply_overrides(&CrawlOverrides {
            quality_threshold: Some(150.0),
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
