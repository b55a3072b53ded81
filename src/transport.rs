//! HTTP transport with bounded retries.
//!
//! The sole point of network I/O in the crate. Callers decide what to cache;
//! the transport only fetches, applies browser-like headers, and retries with
//! linearly increasing delay. Linear rather than exponential backoff is a
//! deliberate simplicity choice for a site that throttles politely.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_DISPOSITION};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Browser-like header set applied to every request. The disclosure site
/// serves an error page to clients without a plausible User-Agent.
const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.9"),
];

/// Response body plus the header the download worker derives filenames from.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Raw response body
    pub bytes: Vec<u8>,
    /// `Content-Disposition` header value, if the server sent one
    pub content_disposition: Option<String>,
}

impl FetchResponse {
    /// Body decoded as UTF-8, lossily. Listing and detail pages are text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// HTTP client with retry, shared by the pipeline and the standalone lookup
/// utilities.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl Transport {
    /// Create a transport with the given retry policy and per-request timeout.
    pub fn new(
        retry_attempts: u32,
        retry_delay: Duration,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::ClientError(e.to_string()))?;
        Ok(Self {
            client,
            retry_attempts: retry_attempts.max(1),
            retry_delay,
        })
    }

    /// GET a URL with retries, returning the body and disposition header.
    ///
    /// `extra_headers` override the fixed browser-like set (e.g. `Referer`).
    /// Any failure (network error, non-2xx status) is retried up to the
    /// configured attempt count; the delay before retry *n* is
    /// `retry_delay × n`. On exhaustion the final underlying error propagates
    /// and the caller decides whether that is fatal or a per-item failure.
    pub async fn fetch(
        &self,
        url: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<FetchResponse, TransportError> {
        let headers = self.build_headers(extra_headers)?;
        let mut last_error = None;

        for attempt in 0..self.retry_attempts {
            if attempt > 0 {
                let backoff = self.retry_delay * attempt;
                debug!(
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying after backoff delay"
                );
                tokio::time::sleep(backoff).await;
            }

            match self.try_fetch(url, headers.clone()).await {
                Ok(response) => {
                    debug!(url, attempt = attempt + 1, "Request succeeded");
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        url,
                        attempt = attempt + 1,
                        max_attempts = self.retry_attempts,
                        error = %e,
                        "Request failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::NetworkError("all retry attempts exhausted".to_string())
        }))
    }

    async fn try_fetch(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<FetchResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| TransportError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::NetworkError(e.to_string()))?;

        Ok(FetchResponse {
            bytes: bytes.to_vec(),
            content_disposition,
        })
    }

    fn build_headers(&self, extra: &[(&str, &str)]) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        for (name, value) in DEFAULT_HEADERS.iter().chain(extra.iter()) {
            let name = HeaderName::try_from(*name)
                .map_err(|e| TransportError::ClientError(format!("bad header name: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::ClientError(format!("bad header value: {e}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Client construction or header assembly failed
    #[error("client error: {0}")]
    ClientError(String),

    /// Network-level failure (connect, timeout, body read)
    #[error("network error: {0}")]
    NetworkError(String),

    /// Server answered with a non-2xx status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Requested URL
        url: String,
    },
}
