//! doccrawl: resumable documentation crawler for RAG pipelines

use anyhow::Result;
use clap::{Parser, Subcommand};
use doccrawl::config::{Config, CrawlOverrides, LogFormat, LogLevel, LoggingConfig, StalePolicy};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;

#[derive(Parser)]
#[command(name = "doccrawl")]
#[command(about = "Polite, resumable documentation crawler for RAG pipelines")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "doccrawl.toml")]
    config: PathBuf,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every configured source, resuming from the last checkpoint
    Crawl {
        /// Minimum quality score for a page to be kept
        #[arg(short, long)]
        quality_threshold: Option<f32>,

        /// Page budget per domain
        #[arg(short, long)]
        max_pages: Option<usize>,

        /// Remove previous crawl data before starting
        #[arg(long)]
        clean: bool,

        /// Resume a checkpoint written under a different configuration
        #[arg(long, conflicts_with = "discard_stale")]
        resume_stale: bool,

        /// Discard a checkpoint written under a different configuration
        #[arg(long)]
        discard_stale: bool,
    },

    /// Remove checkpoints, fingerprints and crawl output
    Clean {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Report on the quality of crawled pages
    Analyze {
        /// Where to write the JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let needs_sources = matches!(cli.command, Commands::Crawl { .. });
    let mut config = load_config(&cli.config, needs_sources)?;
    if let Some(data_dir) = &cli.data_dir {
        config.crawl.data_dir = data_dir.clone();
    }

    init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Crawl {
            quality_threshold,
            max_pages,
            clean,
            resume_stale,
            discard_stale,
        } => {
            let overrides = CrawlOverrides {
                quality_threshold,
                max_pages,
                data_dir: None,
            };
            let stale_policy = if resume_stale {
                Some(StalePolicy::ResumeAnyway)
            } else if discard_stale {
                Some(StalePolicy::Discard)
            } else {
                None
            };
            commands::crawl::crawl(config, overrides, stale_policy, clean).await?;
        }
        Commands::Clean { yes } => {
            commands::clean::clean(&config, yes)?;
        }
        Commands::Analyze { output } => {
            commands::analyze::analyze(&config, output)?;
        }
    }

    Ok(())
}

/// `crawl` needs a valid file; the other commands only need the data directory
fn load_config(path: &Path, needs_sources: bool) -> Result<Config> {
    if needs_sources {
        Config::load(path)
    } else if path.exists() {
        Config::parse_file(path)
    } else {
        Ok(Config::default())
    }
}

fn init_logging(logging: &LoggingConfig, verbose: u8) -> Result<()> {
    let level = LogLevel::from_verbosity(verbose, logging.level);
    // RUST_LOG wins unless -v was given
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if verbose == 0 => {
            EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(level.as_str()))
        }
        _ => EnvFilter::new(level.as_str()),
    };

    match logging.format {
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}
