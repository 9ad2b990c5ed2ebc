//! Tests for downloader configuration and builder behavior.

use braid::{DownloaderBuilder, DownloaderConfig, Error};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;

mod common;
use common::helpers::create_temp_dir;

#[test]
fn test_config_defaults() {
    let config = DownloaderConfig::default();

    assert_eq!(config.connections, 4);
    assert_eq!(config.block_size, 1024 * 1024);
    assert_eq!(config.interval, Duration::from_millis(100));
    assert_eq!(config.timeout, Duration::from_secs(5));
    assert_eq!(config.small_file_cutoff, 10 * 1024 * 1024);
    assert!(config.headers.is_none());
    assert!(config.accept_invalid_certs);
}

#[test]
fn test_builder_defaults() {
    let downloader = DownloaderBuilder::new().build();

    assert_eq!(downloader.connections(), 4);
    assert_eq!(downloader.block_size(), 1024 * 1024);
    assert!(downloader.config().headers.is_none());
}

#[test]
fn test_builder_configuration() {
    let downloader = DownloaderBuilder::new()
        .connections(8)
        .block_size(4 * 1024 * 1024)
        .interval(Duration::from_millis(50))
        .timeout(Duration::from_secs(60))
        .small_file_cutoff(1024)
        .accept_invalid_certs(false)
        .build();

    assert_eq!(downloader.connections(), 8);
    assert_eq!(downloader.block_size(), 4 * 1024 * 1024);
    assert_eq!(downloader.config().interval, Duration::from_millis(50));
    assert_eq!(downloader.config().timeout, Duration::from_secs(60));
    assert_eq!(downloader.config().small_file_cutoff, 1024);
    assert!(!downloader.config().accept_invalid_certs);
}

#[test]
fn test_builder_headers_merge() {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("agent-one"));

    let downloader = DownloaderBuilder::new()
        .headers(headers)
        .header("x-token", HeaderValue::from_static("secret"))
        .build();

    let merged = downloader.config().headers.as_ref().unwrap();
    assert_eq!(merged.get(USER_AGENT).unwrap(), "agent-one");
    assert_eq!(merged.get("x-token").unwrap(), "secret");
}

#[test]
fn test_builder_single_header_replaces() {
    let downloader = DownloaderBuilder::new()
        .header(USER_AGENT, HeaderValue::from_static("first"))
        .header(USER_AGENT, HeaderValue::from_static("second"))
        .build();

    let headers = downloader.config().headers.as_ref().unwrap();
    assert_eq!(headers.get(USER_AGENT).unwrap(), "second");
}

#[tokio::test]
async fn test_download_rejects_invalid_url() {
    let temp = create_temp_dir();
    let downloader = DownloaderBuilder::new().build();
    let result = downloader
        .download("not a url", temp.path().join("out.bin"), None)
        .await;
    assert_eq!(result, Err(Error::InvalidParam));
}

#[tokio::test]
async fn test_download_rejects_zero_connections() {
    let temp = create_temp_dir();
    let downloader = DownloaderBuilder::new().connections(0).build();
    let result = downloader
        .download("http://localhost/file.bin", temp.path().join("out.bin"), None)
        .await;
    assert_eq!(result, Err(Error::InvalidParam));
}

#[tokio::test]
async fn test_download_rejects_bad_block_size() {
    let temp = create_temp_dir();
    let downloader = DownloaderBuilder::new().block_size(0).build();
    let result = downloader
        .download("http://localhost/file.bin", temp.path().join("out.bin"), None)
        .await;
    assert_eq!(result, Err(Error::InvalidParam));
}
