//! Per-item download worker.
//!
//! A worker turns one item id into exactly one [`DownloadOutcome`]: detail
//! resolution, file fetch with the detail page as Referer, filename
//! derivation, and a single write into the destination directory. Errors
//! never escape the worker boundary; the scheduler only reads outcome values.

use crate::resolver::{DetailInfo, DetailResolver, ResolveError};
use crate::transport::{Transport, TransportError};
use crate::DownloadOutcome;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fixed infix and extension of synthesized filenames.
const FALLBACK_INFIX: &str = "Terms";
const FALLBACK_EXT: &str = "pdf";

/// Failure reason when the detail page has no terms row.
const NOT_FOUND_REASON: &str = "Terms file not found";

/// Seam between the scheduler and the per-item work. The production
/// implementation is [`DownloadWorker`]; tests drive the scheduler with
/// instrumented doubles.
#[async_trait]
pub trait ItemWorker: Send + Sync {
    /// Produce exactly one outcome for `item_id`. Must not panic or error
    /// past its own boundary.
    async fn process(&self, item_id: &str) -> DownloadOutcome;
}

/// Production worker: detail resolution, file fetch, filename derivation,
/// file write.
pub struct DownloadWorker {
    detail: DetailResolver,
    transport: Arc<Transport>,
    dest_dir: PathBuf,
}

impl DownloadWorker {
    /// Create a worker writing into `dest_dir`.
    pub fn new(detail: DetailResolver, transport: Arc<Transport>, dest_dir: PathBuf) -> Self {
        Self {
            detail,
            transport,
            dest_dir,
        }
    }

    async fn run(&self, item_id: &str) -> Result<DownloadOutcome, WorkerError> {
        let terms = match self.detail.resolve(item_id).await? {
            DetailInfo::Found(terms) => terms,
            DetailInfo::NotFound => {
                return Ok(DownloadOutcome::failure(item_id, NOT_FOUND_REASON));
            }
        };

        let response = self
            .transport
            .fetch(&terms.file_url, &[("Referer", terms.page_url.as_str())])
            .await?;

        let file_name = derive_filename(
            response.content_disposition.as_deref(),
            &terms.meta.symbol,
            item_id,
        );
        let path = self.dest_dir.join(&file_name);

        // Silent overwrite on name coincidence is acceptable: ledger
        // filtering guarantees an id is never scheduled twice within a run.
        tokio::fs::write(&path, &response.bytes)
            .await
            .map_err(|e| WorkerError::Io(format!("{}: {e}", path.display())))?;

        let bytes = response.bytes.len() as u64;
        info!(item_id, file = %file_name, bytes, "Downloaded terms file");
        Ok(DownloadOutcome::success(item_id, file_name, bytes, terms.meta))
    }
}

#[async_trait]
impl ItemWorker for DownloadWorker {
    async fn process(&self, item_id: &str) -> DownloadOutcome {
        match self.run(item_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(item_id, error = %e, "Item failed");
                DownloadOutcome::failure(item_id, e.to_string())
            }
        }
    }
}

/// Derive the output filename: prefer a well-formed server-provided
/// disposition filename, otherwise synthesize a collision-resistant name from
/// the sanitized symbol and the item id.
fn derive_filename(content_disposition: Option<&str>, symbol: &str, item_id: &str) -> String {
    if let Some(name) = content_disposition.and_then(parse_disposition_filename) {
        debug!(file = %name, "Using server-provided filename");
        return name;
    }
    format!(
        "{}_{FALLBACK_INFIX}_{item_id}.{FALLBACK_EXT}",
        sanitize_component(symbol)
    )
}

/// Extract `filename=` from a Content-Disposition value; `None` if absent or
/// not usable as a bare filename.
fn parse_disposition_filename(value: &str) -> Option<String> {
    let name = value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?
        .trim_matches('"')
        .trim();

    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return None;
    }
    Some(name.to_string())
}

/// Collapse runs of non-alphanumeric characters to underscores and trim them
/// from the ends.
fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_end_matches('_').to_string()
}

/// Worker errors; always converted into failure outcomes at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Detail resolution failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// File fetch failed after retries
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// File write failed
    #[error("write error: {0}")]
    Io(String),
}
