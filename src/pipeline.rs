//! End-to-end run orchestration.
//!
//! One call wires the whole pipeline together: listing resolution, optional
//! symbol filtering, ledger reconciliation, batch scheduling, and the final
//! summary report. Components are constructed here and nowhere else; each run
//! gets a fresh transport, cache handle, and ledger.

use crate::cache::{CacheError, CacheStore};
use crate::config::RunConfig;
use crate::ledger::{FailedRecord, LedgerError, ProgressLedger};
use crate::resolver::{DetailResolver, ListingResolver, ResolveError};
use crate::scheduler::BatchScheduler;
use crate::transport::{Transport, TransportError};
use crate::worker::DownloadWorker;
use crate::DownloadOutcome;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Failure reasons printed in full before the report truncates.
const REPORT_FAILURE_CAP: usize = 10;

/// Aggregate result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Items completed in this run
    pub completed: usize,
    /// Items failed in this run
    pub failed: usize,
    /// Items skipped because a prior run already completed them
    pub skipped: usize,
    /// Total bytes written in this run
    pub bytes_written: u64,
    /// Failure detail for this run, in scheduling order
    pub failures: Vec<FailedRecord>,
}

impl RunSummary {
    fn from_outcomes(outcomes: &[DownloadOutcome], skipped: usize) -> Self {
        let completed = outcomes.iter().filter(|o| o.is_success()).count();
        let failures: Vec<FailedRecord> = outcomes
            .iter()
            .filter_map(|o| match &o.kind {
                crate::OutcomeKind::Failure { reason } => Some(FailedRecord {
                    item_id: o.item_id.clone(),
                    reason: reason.clone(),
                }),
                crate::OutcomeKind::Success { .. } => None,
            })
            .collect();
        Self {
            completed,
            failed: failures.len(),
            skipped,
            bytes_written: outcomes.iter().map(DownloadOutcome::bytes_written).sum(),
            failures,
        }
    }

    /// Log a human-readable report of the run, truncating long failure lists.
    pub fn log_report(&self) {
        info!(
            completed = self.completed,
            failed = self.failed,
            skipped = self.skipped,
            bytes = self.bytes_written,
            "Run complete"
        );
        for failure in self.failures.iter().take(REPORT_FAILURE_CAP) {
            warn!(item_id = %failure.item_id, reason = %failure.reason, "Item failed");
        }
        if self.failures.len() > REPORT_FAILURE_CAP {
            warn!(
                omitted = self.failures.len() - REPORT_FAILURE_CAP,
                "Further failures omitted from report"
            );
        }
    }
}

/// Run the full pipeline for `config`.
///
/// When `allow_list` is given, only listing rows whose symbol appears in it
/// are scheduled; `None` schedules every listed item. Items completed by a
/// prior run are skipped via the ledger and counted in
/// [`RunSummary::skipped`].
pub async fn run(
    config: &RunConfig,
    allow_list: Option<&HashSet<String>>,
) -> Result<RunSummary, PipelineError> {
    info!(
        from = %config.range.from,
        to = %config.range.to,
        dest = %config.dest_dir.display(),
        concurrency = config.concurrency,
        "Starting run"
    );
    std::fs::create_dir_all(&config.dest_dir)
        .map_err(|e| PipelineError::Io(format!("{}: {e}", config.dest_dir.display())))?;

    let transport = Arc::new(Transport::new(
        config.retry_attempts,
        config.retry_delay,
        config.timeout,
    )?);
    let cache = Arc::new(CacheStore::open(&config.cache_dir)?);

    let listing = ListingResolver::new(transport.clone(), cache.clone(), config.clone())?;
    let rows = listing.resolve().await?;

    let selected: Vec<String> = match allow_list {
        Some(allowed) => {
            let kept: Vec<String> = rows
                .iter()
                .filter(|row| allowed.contains(&row.symbol))
                .map(|row| row.item_id.clone())
                .collect();
            info!(
                listed = rows.len(),
                selected = kept.len(),
                "Applied symbol filter"
            );
            kept
        }
        None => rows.iter().map(|row| row.item_id.clone()).collect(),
    };
    // A listing that repeats an id counts it once, matching ledger semantics.
    let mut seen = HashSet::new();
    let selected: Vec<String> = selected
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();

    let mut ledger = ProgressLedger::load(&config.ledger_path);
    ledger.set_pending(&selected)?;
    let pending = ledger.pending().to_vec();
    let skipped = selected.len() - pending.len();
    if skipped > 0 {
        info!(skipped, "Skipping items completed in prior runs");
    }

    let detail = DetailResolver::new(transport.clone(), cache, config.clone())?;
    let worker = DownloadWorker::new(detail, transport, config.dest_dir.clone());

    let mut scheduler = BatchScheduler::new(config.concurrency, ledger);
    let outcomes = scheduler.run(&worker, &pending).await?;

    Ok(RunSummary::from_outcomes(&outcomes, skipped))
}

/// Pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Listing or detail resolution failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Ledger could not be persisted
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Cache directory could not be opened
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Transport client could not be built
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Destination directory could not be created
    #[error("IO error: {0}")]
    Io(String),
}
