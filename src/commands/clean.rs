use anyhow::{bail, Context, Result};
use doccrawl::{config::Config, crawler::CheckpointStore};
use std::io::{BufRead, Write};
use std::path::Path;

pub fn clean(config: &Config, yes: bool) -> Result<()> {
    let data_dir = &config.crawl.data_dir;
    if !data_dir.exists() {
        println!("Nothing to clean: {} does not exist", data_dir.display());
        return Ok(());
    }

    if !yes && !confirm(&format!("Delete all crawl data in {}?", data_dir.display()))? {
        bail!("Aborted: pass --yes to clean without confirmation");
    }

    let removed = remove_crawl_data(config)?;
    println!("Removed {} item(s) from {}", removed, data_dir.display());
    Ok(())
}

/// Remove checkpoints, fingerprints, output and report. Returns how many
/// entries were removed.
pub fn remove_crawl_data(config: &Config) -> Result<usize> {
    let store = CheckpointStore::new(&config.crawl.checkpoint_dir(), config.checkpoint.keep_snapshots);
    let mut removed = store.discard().context("Failed to remove checkpoints")?;

    let files = [
        config.crawl.fingerprint_path(),
        config.crawl.output_path(),
        config.crawl.data_dir.join("quality_report.json"),
    ];
    for path in &files {
        if remove_file(path)? {
            removed += 1;
        }
    }

    let checkpoint_dir = config.crawl.checkpoint_dir();
    if checkpoint_dir.exists() {
        std::fs::remove_dir_all(&checkpoint_dir)
            .with_context(|| format!("Failed to remove {}", checkpoint_dir.display()))?;
    }
    Ok(removed)
}

fn remove_file(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
