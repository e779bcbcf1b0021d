use anyhow::{Context, Result};
use doccrawl::{
    config::{Config, CrawlOverrides, StalePolicy},
    crawler::{CrawlSummary, Orchestrator},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::info;

use super::clean::remove_crawl_data;

pub async fn crawl(
    mut config: Config,
    overrides: CrawlOverrides,
    stale_policy: Option<StalePolicy>,
    clean: bool,
) -> Result<()> {
    config.apply_overrides(&overrides)?;
    if let Some(policy) = stale_policy {
        config.checkpoint.stale_policy = policy;
    }

    if clean {
        let removed = remove_crawl_data(&config)?;
        info!(removed, "Removed previous crawl data");
    }

    let orchestrator = Orchestrator::new(config.clone())
        .context("Failed to build crawler")?
        .listen_for_signals(true);
    let progress = orchestrator.progress();

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let ticker = {
        let pb = pb.clone();
        let progress = progress.clone();
        tokio::spawn(async move {
            loop {
                pb.set_message(format!(
                    "{} accepted / {} processed",
                    progress.accepted(),
                    progress.processed()
                ));
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        })
    };

    let result = orchestrator.run().await;
    ticker.abort();
    pb.finish_and_clear();

    let summary = result.context("Crawl failed")?;
    print_summary(&config, &summary);
    Ok(())
}

fn print_summary(config: &Config, summary: &CrawlSummary) {
    println!("\nCrawl Summary:");
    println!("==============");
    if summary.resumed {
        println!("Resumed from checkpoint");
    }
    if summary.interrupted {
        println!("Interrupted: progress saved, run again to resume");
    }
    println!("Output: {}", config.crawl.output_path().display());
    println!("Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!(
        "Processed this run: {} ({:.2} pages/s)",
        summary.processed_this_run, summary.pages_per_sec
    );
    println!("Peak concurrent fetches: {}", summary.peak_in_flight);
    println!("Fetched:    {}", summary.fetched);
    println!("Accepted:   {}", summary.accepted);
    println!("Rejected:   {}", summary.rejected);
    println!("Duplicate:  {}", summary.duplicate);
    println!("Failed:     {}", summary.failed);
    println!("Disallowed: {}", summary.disallowed);

    if !summary.domains.is_empty() {
        println!("\nDomains:");
        for domain in &summary.domains {
            println!(
                "  {:<32} {:>5} accepted {:>5} fetched {:>5} queued  {}",
                domain.domain, domain.accepted, domain.fetched, domain.queued, domain.status
            );
        }
    }

    if !summary.recent_failures.is_empty() {
        println!("\nRecent failures:");
        for failure in &summary.recent_failures {
            println!("  [{}] {}", failure.class, failure.url);
        }
    }
}
