//! Listing and detail page resolution.
//!
//! Both resolvers sit between the [`crate::cache::CacheStore`] and the
//! [`crate::transport::Transport`]: they know the semantic cache key for a
//! page, so caching decisions live here rather than in the transport. Parsing
//! is tailored to the disclosure site's one page-structure convention (table
//! rows with identifiable header markers) and tolerates markup drift by
//! yielding zero rows instead of failing hard.

use crate::FilingMeta;

pub mod detail;
pub mod listing;

pub use detail::DetailResolver;
pub use listing::ListingResolver;

/// One row of the listing page: the stable item id plus the symbol the
/// allow-list filter matches against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    /// Stable item identifier extracted from the row's link
    pub item_id: String,
    /// Short trading symbol shown in the listing
    pub symbol: String,
}

/// Resolved description of a filing's downloadable terms file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailInfo {
    /// The detail page carries a terms file link
    Found(TermsFile),
    /// No terms row on the detail page; expected and recoverable
    NotFound,
}

/// Download link and descriptive metadata for one filing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsFile {
    /// Absolute URL of the downloadable file
    pub file_url: String,
    /// URL of the detail page itself, used as the download Referer
    pub page_url: String,
    /// Issuer, symbol, as-of date extracted from the page
    pub meta: FilingMeta,
}

/// Resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Underlying fetch failed after retries
    #[error(transparent)]
    Transport(#[from] crate::transport::TransportError),

    /// Cache read or write failed
    #[error(transparent)]
    Cache(#[from] crate::cache::CacheError),

    /// A selector or pattern failed to compile
    #[error("parser setup error: {0}")]
    ParserSetup(String),

    /// A resolved URL could not be joined against the site base
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}
