//! On-disk cache of raw response bodies.
//!
//! Content is addressed by a logical key chosen by the caller (the resolvers
//! know the semantic key; the transport does not cache). Keys are sanitized to
//! a filesystem-safe form before mapping to a file path; collisions from
//! sanitization are accepted as a known limitation. There is no eviction or
//! expiry; wiping the cache means deleting the directory out-of-band.

use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem-backed cache store. Pure synchronous local disk I/O.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Open (creating if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| CacheError::Io(format!("{}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    /// Whether a body is cached under `key`.
    pub fn has(&self, key: &str) -> bool {
        self.path_for(key).exists()
    }

    /// Read the cached body for `key`, or `None` if absent.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let body = std::fs::read(&path)
            .map_err(|e| CacheError::Io(format!("{}: {e}", path.display())))?;
        debug!(key, bytes = body.len(), "Cache hit");
        Ok(Some(body))
    }

    /// Store `body` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, body: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key);
        std::fs::write(&path, body)
            .map_err(|e| CacheError::Io(format!("{}: {e}", path.display())))?;
        debug!(key, bytes = body.len(), "Cached response body");
        Ok(())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(sanitize_key(key))
    }

    /// Cache directory root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Collapse runs of non-alphanumeric characters to a single underscore so any
/// logical key maps to a safe filename.
pub fn sanitize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut last_was_sep = false;
    for c in key.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Underlying filesystem failure
    #[error("cache IO error: {0}")]
    Io(String),
}
