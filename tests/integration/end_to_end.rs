//! Full pipeline runs against a mock disclosure site: download, idempotence,
//! resume after interruption, and retry of previously failed items.

use mockito::{Matcher, Server};
use std::time::Duration;
use tempfile::TempDir;
use terms_downloader::config::{DateRange, RunConfig};
use terms_downloader::ledger::ProgressLedger;
use terms_downloader::pipeline;
use terms_downloader::{DownloadOutcome, FilingMeta};

fn listing_html(rows: &[(&str, &str)]) -> String {
    let mut body = String::from(
        "<table><tr><th>Date</th><th>Issuer</th><th>Symbol</th><th>Filing</th></tr>",
    );
    for (item_id, symbol) in rows {
        body.push_str(&format!(
            "<tr><td>2024-01-02</td><td>Acme Securities</td><td>{symbol}</td>\
             <td><a href=\"#\" onclick=\"openDetail('tddetail.do?method=searchDetail&amp;seqNo={item_id}')\">View</a></td></tr>"
        ));
    }
    body.push_str("</table>");
    body
}

fn detail_html(symbol: &str, file_id: &str) -> String {
    format!(
        "<table>\
         <tr><th>Issuer</th><td>Acme Securities</td></tr>\
         <tr><th>Symbol</th><td>{symbol}</td></tr>\
         <tr><th>As of</th><td>2024-01-05</td></tr>\
         <tr><th>Terms of Issue</th>\
         <td><a href=\"#\" onclick=\"window.open('/filedown.do?method=download&amp;fileId={file_id}')\">Download</a></td></tr>\
         </table>"
    )
}

fn config(base_url: &str, root: &TempDir) -> RunConfig {
    let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
    RunConfig::new(range, root.path().join("files"))
        .with_cache_dir(root.path().join("cache"))
        .with_ledger_path(root.path().join("progress.json"))
        .with_base_url(base_url)
        .with_concurrency(2)
        .with_request_delay(Duration::from_millis(0))
        .with_retry(1, Duration::from_millis(1))
}

fn listing_matcher() -> Matcher {
    Matcher::Regex(r"todisclosure\.do".to_string())
}

fn detail_matcher(item_id: &str) -> Matcher {
    Matcher::Regex(format!(r"tddetail\.do.*seqNo={item_id}$"))
}

fn file_matcher(file_id: &str) -> Matcher {
    Matcher::Regex(format!(r"filedown\.do.*fileId={file_id}$"))
}

#[tokio::test]
async fn test_full_run_downloads_all_listed_files() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", listing_matcher())
        .with_body(listing_html(&[("1001", "AAA"), ("1002", "BBB"), ("1003", "CCC")]))
        .create_async()
        .await;
    for (item_id, symbol, file_id) in
        [("1001", "AAA", "91"), ("1002", "BBB", "92"), ("1003", "CCC", "93")]
    {
        server
            .mock("GET", detail_matcher(item_id))
            .with_body(detail_html(symbol, file_id))
            .create_async()
            .await;
        server
            .mock("GET", file_matcher(file_id))
            .with_body(format!("%PDF {symbol}"))
            .create_async()
            .await;
    }

    let root = TempDir::new().unwrap();
    let config = config(&server.url(), &root);
    let summary = pipeline::run(&config, None).await.unwrap();

    assert_eq!(summary.completed, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 0);
    assert!(summary.bytes_written > 0);

    for (item_id, symbol) in [("1001", "AAA"), ("1002", "BBB"), ("1003", "CCC")] {
        let path = config.dest_dir.join(format!("{symbol}_Terms_{item_id}.pdf"));
        assert!(path.exists(), "missing {}", path.display());
    }

    let ledger = ProgressLedger::load(&config.ledger_path);
    assert_eq!(ledger.stats().completed, 3);
    assert_eq!(ledger.stats().pending, 0);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let mut server = Server::new_async().await;
    // Every mock expects exactly one hit: the second run must be served
    // entirely by the cache and the ledger.
    let listing = server
        .mock("GET", listing_matcher())
        .with_body(listing_html(&[("1001", "AAA"), ("1002", "BBB")]))
        .expect(1)
        .create_async()
        .await;
    let mut page_mocks = Vec::new();
    for (item_id, symbol, file_id) in [("1001", "AAA", "91"), ("1002", "BBB", "92")] {
        page_mocks.push(
            server
                .mock("GET", detail_matcher(item_id))
                .with_body(detail_html(symbol, file_id))
                .expect(1)
                .create_async()
                .await,
        );
        page_mocks.push(
            server
                .mock("GET", file_matcher(file_id))
                .with_body("%PDF")
                .expect(1)
                .create_async()
                .await,
        );
    }

    let root = TempDir::new().unwrap();
    let config = config(&server.url(), &root);

    let first = pipeline::run(&config, None).await.unwrap();
    assert_eq!(first.completed, 2);

    let second = pipeline::run(&config, None).await.unwrap();
    assert_eq!(second.completed, 0);
    assert_eq!(second.failed, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.bytes_written, 0);

    listing.assert_async().await;
    for mock in page_mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn test_resume_skips_items_completed_in_prior_run() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", listing_matcher())
        .with_body(listing_html(&[("1001", "AAA"), ("1002", "BBB")]))
        .create_async()
        .await;
    // 1001 was completed before the interruption; its pages must not be hit.
    let completed_detail = server
        .mock("GET", detail_matcher("1001"))
        .expect(0)
        .create_async()
        .await;
    server
        .mock("GET", detail_matcher("1002"))
        .with_body(detail_html("BBB", "92"))
        .create_async()
        .await;
    server
        .mock("GET", file_matcher("92"))
        .with_body("%PDF")
        .create_async()
        .await;

    let root = TempDir::new().unwrap();
    let config = config(&server.url(), &root);

    let mut prior = ProgressLedger::load(&config.ledger_path);
    prior
        .mark_completed(&DownloadOutcome::success(
            "1001",
            "AAA_Terms_1001.pdf".to_string(),
            10,
            FilingMeta::default(),
        ))
        .unwrap();
    drop(prior);

    let summary = pipeline::run(&config, None).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);
    completed_detail.assert_async().await;
}

#[tokio::test]
async fn test_failed_item_is_retried_on_next_run() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", listing_matcher())
        .with_body(listing_html(&[("1001", "AAA")]))
        .create_async()
        .await;
    server
        .mock("GET", detail_matcher("1001"))
        .with_body(detail_html("AAA", "91"))
        .create_async()
        .await;
    // First file fetch fails, the retry on the next run succeeds.
    let failure = server
        .mock("GET", file_matcher("91"))
        .with_status(500)
        .expect(1)
        .create_async()
        .await;
    let recovery = server
        .mock("GET", file_matcher("91"))
        .with_body("%PDF")
        .expect(1)
        .create_async()
        .await;

    let root = TempDir::new().unwrap();
    let config = config(&server.url(), &root);

    let first = pipeline::run(&config, None).await.unwrap();
    assert_eq!(first.completed, 0);
    assert_eq!(first.failed, 1);
    assert!(first.failures[0].reason.contains("HTTP 500"));

    let second = pipeline::run(&config, None).await.unwrap();
    assert_eq!(second.completed, 1);
    assert_eq!(second.failed, 0);
    // The failed item was never counted as skipped.
    assert_eq!(second.skipped, 0);

    failure.assert_async().await;
    recovery.assert_async().await;

    let ledger = ProgressLedger::load(&config.ledger_path);
    assert_eq!(ledger.stats().completed, 1);
    assert_eq!(ledger.stats().failed, 0);
}

#[tokio::test]
async fn test_duplicate_listing_rows_are_downloaded_once() {
    let mut server = Server::new_async().await;
    // The listing repeats 1001; its pages must still be hit exactly once.
    server
        .mock("GET", listing_matcher())
        .with_body(listing_html(&[("1001", "AAA"), ("1001", "AAA"), ("1002", "BBB")]))
        .create_async()
        .await;
    let dup_detail = server
        .mock("GET", detail_matcher("1001"))
        .with_body(detail_html("AAA", "91"))
        .expect(1)
        .create_async()
        .await;
    let dup_file = server
        .mock("GET", file_matcher("91"))
        .with_body("%PDF")
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", detail_matcher("1002"))
        .with_body(detail_html("BBB", "92"))
        .create_async()
        .await;
    server
        .mock("GET", file_matcher("92"))
        .with_body("%PDF")
        .create_async()
        .await;

    let root = TempDir::new().unwrap();
    let config = config(&server.url(), &root);
    let summary = pipeline::run(&config, None).await.unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 0);
    // The duplicate row is neither scheduled nor miscounted as skipped.
    assert_eq!(summary.skipped, 0);
    dup_detail.assert_async().await;
    dup_file.assert_async().await;

    let ledger = ProgressLedger::load(&config.ledger_path);
    assert_eq!(ledger.stats().completed, 2);
}

#[tokio::test]
async fn test_unwritable_ledger_aborts_the_run() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", listing_matcher())
        .with_body(listing_html(&[("1001", "AAA")]))
        .create_async()
        .await;
    let detail = server
        .mock("GET", detail_matcher("1001"))
        .expect(0)
        .create_async()
        .await;

    let root = TempDir::new().unwrap();
    // A directory at the ledger path makes every persist fail.
    let blocked = root.path().join("progress.json");
    std::fs::create_dir_all(&blocked).unwrap();
    let config = config(&server.url(), &root).with_ledger_path(blocked);

    let err = pipeline::run(&config, None).await.unwrap_err();
    assert!(matches!(err, pipeline::PipelineError::Ledger(_)));
    // Nothing was scheduled once durability was lost.
    detail.assert_async().await;
}

#[tokio::test]
async fn test_item_without_terms_file_fails_without_blocking_others() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", listing_matcher())
        .with_body(listing_html(&[("1001", "AAA"), ("1002", "BBB")]))
        .create_async()
        .await;
    // 1001's detail page has no terms row at all.
    server
        .mock("GET", detail_matcher("1001"))
        .with_body("<table><tr><th>Issuer</th><td>Acme Securities</td></tr></table>")
        .create_async()
        .await;
    server
        .mock("GET", detail_matcher("1002"))
        .with_body(detail_html("BBB", "92"))
        .create_async()
        .await;
    server
        .mock("GET", file_matcher("92"))
        .with_body("%PDF")
        .create_async()
        .await;

    let root = TempDir::new().unwrap();
    let config = config(&server.url(), &root);
    let summary = pipeline::run(&config, None).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].item_id, "1001");
    assert_eq!(summary.failures[0].reason, "Terms file not found");
    assert!(config.dest_dir.join("BBB_Terms_1002.pdf").exists());
}
