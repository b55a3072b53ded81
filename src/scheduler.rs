//! Batch scheduling with bounded concurrency.
//!
//! Pending ids are processed in fixed-size batches: within a batch the
//! workers run concurrently, batches run strictly sequentially, so in-flight
//! requests never exceed the configured ceiling. The ledger is mutated only
//! on the coordinating task after each worker settles - one writer by
//! construction, no locking.

use crate::ledger::{LedgerError, ProgressLedger};
use crate::worker::ItemWorker;
use crate::DownloadOutcome;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

/// Drives an [`ItemWorker`] over the pending set, owning the progress ledger
/// for the duration of a run.
pub struct BatchScheduler {
    concurrency: usize,
    ledger: ProgressLedger,
}

impl BatchScheduler {
    /// Create a scheduler with the given concurrency ceiling (minimum 1).
    pub fn new(concurrency: usize, ledger: ProgressLedger) -> Self {
        Self {
            concurrency: concurrency.max(1),
            ledger,
        }
    }

    /// Process every pending id and return the complete outcome list.
    ///
    /// The ledger is updated synchronously per settled item, not per batch,
    /// so a crash mid-batch loses at most the unsettled in-flight items.
    /// Failed items are not retried within the run; ledger semantics retry
    /// them on the next run.
    pub async fn run(
        &mut self,
        worker: &dyn ItemWorker,
        pending: &[String],
    ) -> Result<Vec<DownloadOutcome>, LedgerError> {
        let mut outcomes = Vec::with_capacity(pending.len());
        let bar = progress_bar(pending.len() as u64);

        for (batch_idx, batch) in pending.chunks(self.concurrency).enumerate() {
            debug!(
                batch = batch_idx + 1,
                size = batch.len(),
                "Dispatching batch"
            );

            let settled = join_all(batch.iter().map(|id| worker.process(id))).await;

            for outcome in settled {
                self.ledger.record(&outcome)?;
                bar.inc(1);
                outcomes.push(outcome);
            }
        }

        bar.finish_and_clear();
        let stats = self.ledger.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            "All batches settled"
        );
        Ok(outcomes)
    }

    /// Borrow the owned ledger for stats and reporting.
    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    /// Exclusive access to the ledger, e.g. for `set_pending`.
    pub fn ledger_mut(&mut self) -> &mut ProgressLedger {
        &mut self.ledger
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
