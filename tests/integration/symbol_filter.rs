//! Allow-list filtering: only listing rows whose symbol is allowed are
//! scheduled; everything else is never touched.

use mockito::{Matcher, Server};
use std::collections::HashSet;
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;
use terms_downloader::config::{load_allow_list, DateRange, RunConfig};
use terms_downloader::pipeline;

const LISTING_HTML: &str = "\
<table><tr><th>Date</th><th>Issuer</th><th>Symbol</th><th>Filing</th></tr>\
<tr><td>2024-01-02</td><td>Acme</td><td>AAA</td>\
<td><a href=\"#\" onclick=\"openDetail('tddetail.do?method=searchDetail&amp;seqNo=1001')\">View</a></td></tr>\
<tr><td>2024-01-02</td><td>Beta</td><td>BBB</td>\
<td><a href=\"#\" onclick=\"openDetail('tddetail.do?method=searchDetail&amp;seqNo=1002')\">View</a></td></tr>\
<tr><td>2024-01-03</td><td>Gamma</td><td>CCC</td>\
<td><a href=\"#\" onclick=\"openDetail('tddetail.do?method=searchDetail&amp;seqNo=1003')\">View</a></td></tr>\
</table>";

const DETAIL_BBB: &str = "\
<table>\
<tr><th>Issuer</th><td>Beta</td></tr>\
<tr><th>Symbol</th><td>BBB</td></tr>\
<tr><th>As of</th><td>2024-01-05</td></tr>\
<tr><th>Terms of Issue</th>\
<td><a href=\"#\" onclick=\"window.open('/filedown.do?method=download&amp;fileId=92')\">Download</a></td></tr>\
</table>";

fn config(base_url: &str, root: &TempDir) -> RunConfig {
    let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
    RunConfig::new(range, root.path().join("files"))
        .with_cache_dir(root.path().join("cache"))
        .with_ledger_path(root.path().join("progress.json"))
        .with_base_url(base_url)
        .with_request_delay(Duration::from_millis(0))
        .with_retry(1, Duration::from_millis(1))
}

fn allowed(symbols: &[&str]) -> HashSet<String> {
    symbols.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_only_allowed_symbols_are_scheduled() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"todisclosure\.do".to_string()))
        .with_body(LISTING_HTML)
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex(r"tddetail\.do.*seqNo=1002$".to_string()))
        .with_body(DETAIL_BBB)
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex(r"filedown\.do.*fileId=92$".to_string()))
        .with_body("%PDF")
        .create_async()
        .await;
    let excluded_one = server
        .mock("GET", Matcher::Regex(r"tddetail\.do.*seqNo=1001$".to_string()))
        .expect(0)
        .create_async()
        .await;
    let excluded_two = server
        .mock("GET", Matcher::Regex(r"tddetail\.do.*seqNo=1003$".to_string()))
        .expect(0)
        .create_async()
        .await;

    let root = TempDir::new().unwrap();
    let config = config(&server.url(), &root);
    let allow = allowed(&["BBB", "ZZZ"]);
    let summary = pipeline::run(&config, Some(&allow)).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);
    assert!(config.dest_dir.join("BBB_Terms_1002.pdf").exists());
    excluded_one.assert_async().await;
    excluded_two.assert_async().await;
}

#[tokio::test]
async fn test_disjoint_allow_list_yields_empty_run() {
    let mut server = Server::new_async().await;
    let listing = server
        .mock("GET", Matcher::Regex(r"todisclosure\.do".to_string()))
        .with_body(LISTING_HTML)
        .expect(1)
        .create_async()
        .await;
    let details = server
        .mock("GET", Matcher::Regex(r"tddetail\.do".to_string()))
        .expect(0)
        .create_async()
        .await;

    let root = TempDir::new().unwrap();
    let config = config(&server.url(), &root);
    let allow = allowed(&["XXX", "YYY"]);
    let summary = pipeline::run(&config, Some(&allow)).await.unwrap();

    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 0);
    listing.assert_async().await;
    details.assert_async().await;
}

#[tokio::test]
async fn test_allow_list_file_feeds_the_filter() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"todisclosure\.do".to_string()))
        .with_body(LISTING_HTML)
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex(r"tddetail\.do.*seqNo=1002$".to_string()))
        .with_body(DETAIL_BBB)
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex(r"filedown\.do.*fileId=92$".to_string()))
        .with_body("%PDF")
        .create_async()
        .await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# watched symbols\nBBB").unwrap();
    let allow = load_allow_list(file.path()).unwrap();

    let root = TempDir::new().unwrap();
    let config = config(&server.url(), &root);
    let summary = pipeline::run(&config, Some(&allow)).await.unwrap();
    assert_eq!(summary.completed, 1);
}
