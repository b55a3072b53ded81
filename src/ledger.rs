//! Durable progress ledger.
//!
//! The ledger is the single source of truth for resumability: one JSON file
//! with `completed`, `failed`, and `pending` arrays, flushed to disk
//! synchronously after every state transition. Write-per-event durability is a
//! deliberate trade-off against I/O volume; coalescing writes would change the
//! crash-safety guarantee. Writes are atomic (temp file plus rename) in the
//! same pattern used for checkpoint state elsewhere in our tooling.

use crate::{DownloadOutcome, FilingMeta, OutcomeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A completed item with the descriptive fields other tooling may read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedRecord {
    /// Stable item identifier
    pub item_id: String,
    /// Filename written into the destination directory
    pub file_name: String,
    /// Size of the written file in bytes
    pub bytes: u64,
    /// Issuer, symbol, as-of date from the detail page
    #[serde(flatten)]
    pub meta: FilingMeta,
}

/// A failed item and why it failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedRecord {
    /// Stable item identifier
    pub item_id: String,
    /// Human-readable failure reason
    pub reason: String,
}

/// Aggregate counts for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerStats {
    /// Items completed across all runs
    pub completed: usize,
    /// Items currently recorded as failed
    pub failed: usize,
    /// Items still pending in this run
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LedgerState {
    completed: Vec<CompletedRecord>,
    failed: Vec<FailedRecord>,
    pending: Vec<String>,
}

/// Durable record of per-item completion state.
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    state: LedgerState,
}

impl ProgressLedger {
    /// Load prior state from `path`. A missing or unparsable file initializes
    /// to empty state; corrupt progress is "no prior progress", never fatal.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<LedgerState>(&contents) {
                Ok(state) => {
                    info!(
                        path = %path.display(),
                        completed = state.completed.len(),
                        failed = state.failed.len(),
                        "Loaded progress ledger"
                    );
                    state
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Progress ledger unparsable; starting from empty state"
                    );
                    LedgerState::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "No progress ledger found; starting fresh");
                LedgerState::default()
            }
        };
        Self { path, state }
    }

    /// Whether `item_id` has already been completed in a prior run.
    pub fn is_completed(&self, item_id: &str) -> bool {
        self.state.completed.iter().any(|r| r.item_id == item_id)
    }

    /// Recompute `pending` as `all_ids` minus already-completed ids, preserving
    /// listing order, and persist. Called once per run after listing
    /// resolution, before scheduling. Duplicate ids are kept once (first
    /// occurrence wins), so an id is never scheduled twice within a run.
    /// Failed items are deliberately not excluded, so they are retried on the
    /// next run.
    pub fn set_pending(&mut self, all_ids: &[String]) -> Result<(), LedgerError> {
        let completed: HashSet<&str> = self
            .state
            .completed
            .iter()
            .map(|r| r.item_id.as_str())
            .collect();
        let mut seen = HashSet::new();
        self.state.pending = all_ids
            .iter()
            .filter(|id| !completed.contains(id.as_str()) && seen.insert(id.as_str()))
            .cloned()
            .collect();
        info!(
            total = all_ids.len(),
            pending = self.state.pending.len(),
            "Recomputed pending set"
        );
        self.persist()
    }

    /// Record a settled outcome, routing to completed or failed.
    pub fn record(&mut self, outcome: &DownloadOutcome) -> Result<(), LedgerError> {
        match &outcome.kind {
            OutcomeKind::Success { .. } => self.mark_completed(outcome),
            OutcomeKind::Failure { .. } => self.mark_failed(outcome),
        }
    }

    /// Append a completed record, drop the id from pending and from any prior
    /// failed entry, and persist synchronously.
    pub fn mark_completed(&mut self, outcome: &DownloadOutcome) -> Result<(), LedgerError> {
        let (file_name, bytes, meta) = match &outcome.kind {
            OutcomeKind::Success {
                file_name,
                bytes,
                meta,
            } => (file_name.clone(), *bytes, meta.clone()),
            OutcomeKind::Failure { .. } => {
                return Err(LedgerError::InvalidOutcome(outcome.item_id.clone()))
            }
        };
        self.state.failed.retain(|r| r.item_id != outcome.item_id);
        self.state
            .completed
            .retain(|r| r.item_id != outcome.item_id);
        self.state.completed.push(CompletedRecord {
            item_id: outcome.item_id.clone(),
            file_name,
            bytes,
            meta,
        });
        self.remove_pending(&outcome.item_id);
        self.persist()
    }

    /// Append (or replace) a failed record, drop the id from pending, and
    /// persist synchronously.
    pub fn mark_failed(&mut self, outcome: &DownloadOutcome) -> Result<(), LedgerError> {
        let reason = match &outcome.kind {
            OutcomeKind::Failure { reason } => reason.clone(),
            OutcomeKind::Success { .. } => {
                return Err(LedgerError::InvalidOutcome(outcome.item_id.clone()))
            }
        };
        self.state.failed.retain(|r| r.item_id != outcome.item_id);
        self.state.failed.push(FailedRecord {
            item_id: outcome.item_id.clone(),
            reason,
        });
        self.remove_pending(&outcome.item_id);
        self.persist()
    }

    /// Current pending ids, in listing order.
    pub fn pending(&self) -> &[String] {
        &self.state.pending
    }

    /// Completed records across all runs.
    pub fn completed(&self) -> &[CompletedRecord] {
        &self.state.completed
    }

    /// Failed records from this run.
    pub fn failed(&self) -> &[FailedRecord] {
        &self.state.failed
    }

    /// Aggregate counts for reporting.
    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            completed: self.state.completed.len(),
            failed: self.state.failed.len(),
            pending: self.state.pending.len(),
        }
    }

    fn remove_pending(&mut self, item_id: &str) {
        self.state.pending.retain(|id| id != item_id);
    }

    /// Atomic durable write: temp file in the target directory, flush, sync,
    /// rename. A persist failure is fatal for the run - silently losing
    /// durability would break the resumability guarantee.
    fn persist(&self) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LedgerError::Io(format!("{}: {e}", parent.display())))?;
        }

        let json = serde_json::to_string_pretty(&self.state)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        let parent_dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| LedgerError::Io(format!("failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| LedgerError::Io(format!("failed to write temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| LedgerError::Io(format!("failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| LedgerError::Io(format!("failed to sync temp file: {e}")))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| LedgerError::Io(format!("failed to persist ledger: {e}")))?;

        debug!(
            path = %self.path.display(),
            completed = self.state.completed.len(),
            failed = self.state.failed.len(),
            pending = self.state.pending.len(),
            "Progress ledger persisted"
        );
        Ok(())
    }
}

/// Ledger errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Filesystem failure while persisting
    #[error("ledger IO error: {0}")]
    Io(String),

    /// State could not be serialized
    #[error("ledger serialization error: {0}")]
    Serialization(String),

    /// Outcome kind did not match the requested transition
    #[error("outcome kind mismatch for item {0}")]
    InvalidOutcome(String),
}
