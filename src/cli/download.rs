//! Download command implementation

use crate::config::{
    load_allow_list, DateRange, RunConfig, DEFAULT_BASE_URL, DEFAULT_REQUEST_DELAY_MS,
    DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_SECS,
};
use crate::pipeline::{self, RunSummary};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::CliError;

/// Maximum allowed concurrency to prevent self-inflicted rate limiting
const MAX_CONCURRENCY: usize = 16;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Terms Downloader CLI
#[derive(Parser, Debug)]
#[command(name = "terms-downloader")]
#[command(about = "Download structured-product terms filings from the disclosure site", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download terms files listed for a date range
    Download(DownloadArgs),
}

/// Arguments of the download command
#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// First listing date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub from: String,

    /// Last listing date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub to: String,

    /// Destination directory for downloaded files
    #[arg(long, default_value = "downloads")]
    pub dest: PathBuf,

    /// Cache directory (default: <dest>/.cache)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Progress ledger path (default: <dest>/progress.json)
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Disclosure site base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Number of concurrent downloads per batch
    #[arg(long, default_value = "3", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Pacing delay before each detail-page fetch, in milliseconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_DELAY_MS)]
    pub request_delay_ms: u64,

    /// Total attempts per network call, including the first
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: u32,

    /// Base delay for linear retry backoff, in milliseconds
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Optional symbol allow-list file, one symbol per line
    #[arg(long)]
    pub allow_list: Option<PathBuf>,
}

impl DownloadArgs {
    /// Build the run configuration and execute the pipeline.
    pub async fn execute(&self) -> Result<RunSummary, CliError> {
        let range = DateRange::parse(&self.from, &self.to)?;

        let mut config = RunConfig::new(range, self.dest.clone())
            .with_base_url(&self.base_url)
            .with_concurrency(self.concurrency)
            .with_request_delay(Duration::from_millis(self.request_delay_ms))
            .with_retry(self.max_retries, Duration::from_millis(self.retry_delay_ms))
            .with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(cache_dir) = &self.cache_dir {
            config = config.with_cache_dir(cache_dir.clone());
        }
        if let Some(ledger) = &self.ledger {
            config = config.with_ledger_path(ledger.clone());
        }

        let allow_list = match &self.allow_list {
            Some(path) => {
                let list = load_allow_list(path)?;
                info!(symbols = list.len(), path = %path.display(), "Loaded allow-list");
                Some(list)
            }
            None => None,
        };

        let summary = pipeline::run(&config, allow_list.as_ref()).await?;
        summary.log_report();
        Ok(summary)
    }
}
