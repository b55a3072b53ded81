//! # Terms Downloader Library
//!
//! A resumable bulk downloader for structured-product terms filings (PDF)
//! published on a disclosure site. The site exposes a listing page per date
//! range and a per-item detail page carrying the actual file link; this
//! library discovers the items, resolves their download URLs, and fetches the
//! files with bounded concurrency.
//!
//! ## Features
//!
//! - **Resume Capability**: A durable progress ledger records every completed
//!   and failed item; interrupted runs pick up exactly where they left off and
//!   never re-download completed files.
//! - **Response Caching**: Listing and detail pages are cached on disk by
//!   logical key, so repeated runs over the same date range avoid repeat
//!   fetches entirely.
//! - **Bounded Concurrency**: Downloads run in fixed-size batches; in-flight
//!   requests never exceed the configured ceiling.
//! - **Retry with Backoff**: Every network call retries with linearly
//!   increasing delay before surfacing an error.
//!
//! ## Quick Start
//!
//! ```no_run
//! use terms_downloader::config::{DateRange, RunConfig};
//! use terms_downloader::pipeline;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let range = DateRange::parse("2024-01-01", "2024-01-31")?;
//! let config = RunConfig::new(range, "./downloads".into());
//! let summary = pipeline::run(&config, None).await?;
//! summary.log_report();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several core modules:
//!
//! - [`config`] - Immutable run configuration and date ranges
//! - [`transport`] - HTTP transport with retry and browser-like headers
//! - [`cache`] - On-disk cache of raw page bodies keyed by logical name
//! - [`ledger`] - Durable progress ledger driving resumability
//! - [`resolver`] - Listing and detail page resolution
//! - [`worker`] - Per-item download worker producing structured outcomes
//! - [`scheduler`] - Batch scheduler with bounded concurrency
//! - [`pipeline`] - End-to-end run orchestration and summary reporting

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

/// On-disk response cache
pub mod cache;

/// CLI command implementations
pub mod cli;

/// Run configuration
pub mod config;

/// Durable progress ledger
pub mod ledger;

/// End-to-end pipeline orchestration
pub mod pipeline;

/// Listing and detail page resolution
pub mod resolver;

/// Batch scheduling with bounded concurrency
pub mod scheduler;

/// HTTP transport with retry
pub mod transport;

/// Per-item download worker
pub mod worker;

// Re-export the transport client: the spreadsheet-driven lookup utilities
// reuse it for their own page fetches.
pub use transport::Transport;

/// Descriptive metadata extracted from a filing's detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FilingMeta {
    /// Issuing institution name (e.g., "Acme Securities")
    pub issuer: String,
    /// Short trading symbol of the instrument
    pub symbol: String,
    /// As-of date of the filing as printed on the page
    pub as_of: String,
}

/// Result of one download worker invocation.
///
/// Workers never raise past their own boundary; every per-item condition is
/// captured here and read by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// Stable identifier of the work item
    pub item_id: String,
    /// Success or failure detail
    pub kind: OutcomeKind,
}

/// Discriminated success/failure detail of a [`DownloadOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// File fetched and written to the destination directory
    Success {
        /// Final filename within the destination directory
        file_name: String,
        /// Size of the written file in bytes
        bytes: u64,
        /// Metadata extracted from the detail page
        meta: FilingMeta,
    },
    /// Item could not be completed
    Failure {
        /// Human-readable reason
        reason: String,
    },
}

impl DownloadOutcome {
    /// Build a success outcome.
    pub fn success(
        item_id: impl Into<String>,
        file_name: String,
        bytes: u64,
        meta: FilingMeta,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            kind: OutcomeKind::Success {
                file_name,
                bytes,
                meta,
            },
        }
    }

    /// Build a failure outcome carrying a reason string.
    pub fn failure(item_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            kind: OutcomeKind::Failure {
                reason: reason.into(),
            },
        }
    }

    /// Whether this outcome is a success.
    pub fn is_success(&self) -> bool {
        matches!(self.kind, OutcomeKind::Success { .. })
    }

    /// Bytes written on success, zero on failure.
    pub fn bytes_written(&self) -> u64 {
        match &self.kind {
            OutcomeKind::Success { bytes, .. } => *bytes,
            OutcomeKind::Failure { .. } => 0,
        }
    }
}
