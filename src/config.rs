//! Immutable run configuration.
//!
//! A [`RunConfig`] is constructed once before the pipeline starts and passed
//! by reference into every component. Nothing mutates it afterwards; there is
//! deliberately no global settings object anywhere in the crate.

use chrono::NaiveDate;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Default disclosure site base against which relative file URLs are resolved.
pub const DEFAULT_BASE_URL: &str = "https://kind.krx.co.kr";

/// Default number of concurrent downloads per batch.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default pacing delay applied before each detail-page fetch.
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 300;

/// Default total attempts per network call (initial try plus retries).
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default base delay for linear retry backoff.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Inclusive date range a listing page is fetched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// First day, inclusive
    pub from: NaiveDate,
    /// Last day, inclusive
    pub to: NaiveDate,
}

impl DateRange {
    /// Parse a range from two `YYYY-MM-DD` strings, validating ordering.
    pub fn parse(from: &str, to: &str) -> Result<Self, ConfigError> {
        let from = NaiveDate::parse_from_str(from, "%Y-%m-%d")
            .map_err(|e| ConfigError::InvalidDate(format!("{from}: {e}")))?;
        let to = NaiveDate::parse_from_str(to, "%Y-%m-%d")
            .map_err(|e| ConfigError::InvalidDate(format!("{to}: {e}")))?;
        Self::new(from, to)
    }

    /// Build a range from already-parsed dates, validating ordering.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ConfigError> {
        if to < from {
            return Err(ConfigError::InvalidRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// Compact `YYYYMMDD` rendering of the start date, used in URLs and keys.
    pub fn from_compact(&self) -> String {
        self.from.format("%Y%m%d").to_string()
    }

    /// Compact `YYYYMMDD` rendering of the end date.
    pub fn to_compact(&self) -> String {
        self.to.format("%Y%m%d").to_string()
    }

    /// Deterministic cache key for the listing page of this range.
    pub fn listing_cache_key(&self) -> String {
        format!("listing_{}_{}", self.from_compact(), self.to_compact())
    }
}

/// Configuration for one pipeline run. Immutable after construction.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Date range to list filings for
    pub range: DateRange,
    /// Directory downloaded files are written into
    pub dest_dir: PathBuf,
    /// Directory for cached page bodies
    pub cache_dir: PathBuf,
    /// Path of the progress ledger file
    pub ledger_path: PathBuf,
    /// Base URL of the disclosure site
    pub base_url: String,
    /// Maximum in-flight downloads per batch
    pub concurrency: usize,
    /// Pacing delay before each detail-page fetch
    pub request_delay: Duration,
    /// Total attempts per network call (initial try plus retries)
    pub retry_attempts: u32,
    /// Base delay for linear retry backoff
    pub retry_delay: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl RunConfig {
    /// Create a configuration with defaults for everything but the range and
    /// destination. Cache and ledger live under the destination directory.
    pub fn new(range: DateRange, dest_dir: PathBuf) -> Self {
        let cache_dir = dest_dir.join(".cache");
        let ledger_path = dest_dir.join("progress.json");
        Self {
            range,
            dest_dir,
            cache_dir,
            ledger_path,
            base_url: DEFAULT_BASE_URL.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Override the disclosure site base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the cache directory.
    pub fn with_cache_dir(mut self, cache_dir: PathBuf) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    /// Override the ledger file path.
    pub fn with_ledger_path(mut self, ledger_path: PathBuf) -> Self {
        self.ledger_path = ledger_path;
        self
    }

    /// Override the concurrency ceiling (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Override the per-item pacing delay.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Override retry attempts and base delay.
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL of the listing page for the configured range.
    pub fn listing_url(&self) -> String {
        format!(
            "{}/disclosure/todisclosure.do?method=searchTodisclosureSub&fromDate={}&toDate={}",
            self.base_url,
            self.range.from_compact(),
            self.range.to_compact()
        )
    }

    /// URL of the detail page for one item.
    pub fn detail_url(&self, item_id: &str) -> String {
        format!(
            "{}/disclosure/tddetail.do?method=searchDetail&seqNo={item_id}",
            self.base_url
        )
    }
}

/// Load an optional symbol allow-list from a newline-delimited file.
///
/// Stands in for the spreadsheet collaborator: one symbol per line, blank
/// lines and `#` comments ignored.
pub fn load_allow_list(path: &std::path::Path) -> Result<HashSet<String>, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::AllowListUnreadable(format!("{}: {e}", path.display())))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Date string failed to parse
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// End date precedes start date
    #[error("invalid range: {to} is before {from}")]
    InvalidRange {
        /// Start date
        from: NaiveDate,
        /// End date
        to: NaiveDate,
    },

    /// Allow-list file could not be read
    #[error("allow-list unreadable: {0}")]
    AllowListUnreadable(String),
}
