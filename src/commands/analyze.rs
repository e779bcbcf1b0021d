use anyhow::{Context, Result};
use doccrawl::{config::Config, crawler::read_records, report::QualityReport};
use std::path::PathBuf;
use tracing::info;

pub fn analyze(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let input = config.crawl.output_path();
    if !input.exists() {
        println!("No crawl output found at {}", input.display());
        println!("\nRun a crawl first with:");
        println!("  doccrawl crawl");
        return Ok(());
    }

    let records = read_records(&input).with_context(|| format!("Failed to read {}", input.display()))?;
    let report = QualityReport::build(&records);

    println!("\nCrawl Quality Report:");
    println!("=====================");
    println!("Source: {}", input.display());
    println!("Total pages: {}", report.total_pages);
    println!("Total words: {}", report.total_words);
    println!("Average quality: {:.1}", report.avg_quality);
    if report.duplicate_hashes > 0 {
        println!("Repeated content hashes: {}", report.duplicate_hashes);
    }

    if !report.domains.is_empty() {
        println!("\nBy domain:");
        for (domain, stats) in &report.domains {
            println!(
                "  {:<32} {:>5} pages  avg {:>5.1}  min {:>5.1}  max {:>5.1}",
                domain, stats.pages, stats.avg_quality, stats.min_quality, stats.max_quality
            );
        }
    }

    println!("\nQuality ranges:");
    for (range, count) in &report.quality_ranges {
        println!("  {:<8} {}", range, count);
    }

    print_counts("Languages", &report.languages);
    print_counts("Content types", &report.content_types);
    print_counts("Categories", &report.categories);

    let path = output.unwrap_or_else(|| config.crawl.data_dir.join("quality_report.json"));
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote quality report");
    println!("\nReport written to {}", path.display());

    Ok(())
}

fn print_counts(title: &str, counts: &std::collections::BTreeMap<String, usize>) {
    if counts.is_empty() {
        return;
    }
    println!("\n{}:", title);
    for (name, count) in counts {
        println!("  {:<16} {}", name, count);
    }
}
