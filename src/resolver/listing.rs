//! Listing page resolution.
//!
//! Fetches (or reads from cache) the listing page for a date range and
//! extracts the ordered set of item ids. The listing is the entry point of a
//! run: a fetch failure here is fatal, but a page with zero matching rows is
//! simply "no work".

use super::{ListingRow, ResolveError};
use crate::cache::CacheStore;
use crate::config::RunConfig;
use crate::transport::Transport;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, info};

/// Header cell text identifying the symbol column of the listing table.
const SYMBOL_HEADER_MARKER: &str = "Symbol";

/// Item ids are embedded in the last cell's link as a query parameter.
const ITEM_ID_PATTERN: &str = r"seqNo=(\d+)";

/// Resolves a date range to the ordered item ids listed for it.
pub struct ListingResolver {
    transport: Arc<Transport>,
    cache: Arc<CacheStore>,
    config: RunConfig,
    table_selector: Selector,
    row_selector: Selector,
    header_selector: Selector,
    cell_selector: Selector,
    item_id_re: Regex,
}

impl ListingResolver {
    /// Create a resolver; compiles the fixed selectors and id pattern.
    pub fn new(
        transport: Arc<Transport>,
        cache: Arc<CacheStore>,
        config: RunConfig,
    ) -> Result<Self, ResolveError> {
        Ok(Self {
            transport,
            cache,
            config,
            table_selector: parse_selector("table")?,
            row_selector: parse_selector("tr")?,
            header_selector: parse_selector("th")?,
            cell_selector: parse_selector("td")?,
            item_id_re: Regex::new(ITEM_ID_PATTERN)
                .map_err(|e| ResolveError::ParserSetup(e.to_string()))?,
        })
    }

    /// Resolve the configured date range to listing rows.
    ///
    /// Cache hit skips the network entirely; a transport failure propagates as
    /// fatal since without a listing there is nothing to schedule.
    pub async fn resolve(&self) -> Result<Vec<ListingRow>, ResolveError> {
        let key = self.config.range.listing_cache_key();
        let body = match self.cache.get(&key)? {
            Some(body) => {
                debug!(key, "Listing served from cache");
                String::from_utf8_lossy(&body).into_owned()
            }
            None => {
                let url = self.config.listing_url();
                info!(url, "Fetching listing page");
                let response = self.transport.fetch(&url, &[]).await?;
                self.cache.set(&key, &response.bytes)?;
                response.text()
            }
        };

        let rows = self.parse(&body);
        info!(rows = rows.len(), "Listing resolved");
        Ok(rows)
    }

    /// Parse listing markup. Unexpected structure yields zero rows rather
    /// than an error, tolerating markup drift gracefully.
    fn parse(&self, html: &str) -> Vec<ListingRow> {
        let document = Html::parse_document(html);

        for table in document.select(&self.table_selector) {
            let Some(symbol_idx) = self.symbol_column_index(&table) else {
                continue;
            };

            let mut rows = Vec::new();
            for row in table.select(&self.row_selector) {
                let cells: Vec<ElementRef> = row.select(&self.cell_selector).collect();
                let Some(last) = cells.last() else {
                    continue; // header row
                };

                // Non-actionable rows carry no item link; skip silently.
                let Some(item_id) = self.extract_item_id(&last.inner_html()) else {
                    continue;
                };

                let symbol = cells
                    .get(symbol_idx)
                    .map(|c| cell_text(c))
                    .unwrap_or_default();

                rows.push(ListingRow { item_id, symbol });
            }
            return rows;
        }

        debug!("No table with a symbol column found in listing markup");
        Vec::new()
    }

    /// Index of the symbol column, located via the header marker.
    fn symbol_column_index(&self, table: &ElementRef) -> Option<usize> {
        table
            .select(&self.header_selector)
            .position(|th| cell_text(&th).contains(SYMBOL_HEADER_MARKER))
    }

    fn extract_item_id(&self, cell_html: &str) -> Option<String> {
        self.item_id_re
            .captures(cell_html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ResolveError> {
    Selector::parse(selector).map_err(|e| ResolveError::ParserSetup(format!("{selector}: {e}")))
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}
