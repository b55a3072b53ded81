//! Detail page resolution.
//!
//! A filing's detail page is a label/value table; the terms file row carries
//! the real download URL inside an inline `window.open` attribute (the
//! anchor's `href` is a placeholder in the source markup). The resolver
//! un-escapes HTML entities, resolves relative URLs against the site base,
//! and extracts the descriptive metadata the ledger records.

use super::{DetailInfo, ResolveError, TermsFile};
use crate::cache::CacheStore;
use crate::config::RunConfig;
use crate::transport::Transport;
use crate::FilingMeta;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Leading label identifying the downloadable terms row.
const TERMS_ROW_MARKER: &str = "Terms";

/// Labels of the metadata rows.
const ISSUER_LABEL: &str = "Issuer";
const SYMBOL_LABEL: &str = "Symbol";
const AS_OF_LABEL: &str = "As of";

/// The real target hides in an inline navigation attribute.
const NAV_URL_PATTERN: &str = r"window\.open\(\s*'([^']+)'";

/// Resolves an item id to its downloadable terms file description.
pub struct DetailResolver {
    transport: Arc<Transport>,
    cache: Arc<CacheStore>,
    config: RunConfig,
    row_selector: Selector,
    label_selector: Selector,
    value_selector: Selector,
    nav_url_re: Regex,
}

impl DetailResolver {
    /// Create a resolver; compiles the fixed selectors and URL pattern.
    pub fn new(
        transport: Arc<Transport>,
        cache: Arc<CacheStore>,
        config: RunConfig,
    ) -> Result<Self, ResolveError> {
        Ok(Self {
            transport,
            cache,
            config,
            row_selector: parse_selector("tr")?,
            label_selector: parse_selector("th")?,
            value_selector: parse_selector("td")?,
            nav_url_re: Regex::new(NAV_URL_PATTERN)
                .map_err(|e| ResolveError::ParserSetup(e.to_string()))?,
        })
    }

    /// Resolve one item's detail page, using the cache when possible.
    ///
    /// On a cache miss a pacing delay is applied before the transport call
    /// (per item, not per retry) to avoid triggering remote rate limiting.
    pub async fn resolve(&self, item_id: &str) -> Result<DetailInfo, ResolveError> {
        let key = format!("detail_{item_id}");
        let page_url = self.config.detail_url(item_id);

        let body = match self.cache.get(&key)? {
            Some(body) => {
                debug!(item_id, "Detail page served from cache");
                String::from_utf8_lossy(&body).into_owned()
            }
            None => {
                tokio::time::sleep(self.config.request_delay).await;
                debug!(item_id, url = %page_url, "Fetching detail page");
                let response = self.transport.fetch(&page_url, &[]).await?;
                self.cache.set(&key, &response.bytes)?;
                response.text()
            }
        };

        self.parse(&body, &page_url)
    }

    /// Parse detail markup into a [`DetailInfo`].
    fn parse(&self, html: &str, page_url: &str) -> Result<DetailInfo, ResolveError> {
        let document = Html::parse_document(html);

        let mut meta = FilingMeta::default();
        let mut file_url = None;

        for row in document.select(&self.row_selector) {
            let Some(label) = self.row_label(&row) else {
                continue;
            };
            let value = row
                .select(&self.value_selector)
                .next()
                .map(|c| cell_text(&c))
                .unwrap_or_default();

            if label.starts_with(TERMS_ROW_MARKER) {
                file_url = self.extract_file_url(&row)?;
            } else if label.starts_with(ISSUER_LABEL) {
                meta.issuer = value;
            } else if label.starts_with(SYMBOL_LABEL) {
                meta.symbol = value;
            } else if label.starts_with(AS_OF_LABEL) {
                meta.as_of = value;
            }
        }

        match file_url {
            Some(file_url) => {
                info!(symbol = %meta.symbol, url = %file_url, "Resolved terms file");
                Ok(DetailInfo::Found(TermsFile {
                    file_url,
                    page_url: page_url.to_string(),
                    meta,
                }))
            }
            None => {
                debug!("No terms row on detail page");
                Ok(DetailInfo::NotFound)
            }
        }
    }

    fn row_label(&self, row: &ElementRef) -> Option<String> {
        row.select(&self.label_selector)
            .next()
            .map(|c| cell_text(&c))
    }

    /// Pull the navigation target out of the row's inline attribute,
    /// un-escaping entities and resolving against the site base.
    fn extract_file_url(&self, row: &ElementRef) -> Result<Option<String>, ResolveError> {
        let decoded = html_escape::decode_html_entities(&row.inner_html()).into_owned();
        let Some(target) = self
            .nav_url_re
            .captures(&decoded)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
        else {
            return Ok(None);
        };

        let base = Url::parse(&self.config.base_url)
            .map_err(|e| ResolveError::InvalidUrl(format!("{}: {e}", self.config.base_url)))?;
        let absolute = base
            .join(&target)
            .map_err(|e| ResolveError::InvalidUrl(format!("{target}: {e}")))?;
        Ok(Some(absolute.to_string()))
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ResolveError> {
    Selector::parse(selector).map_err(|e| ResolveError::ParserSetup(format!("{selector}: {e}")))
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}
