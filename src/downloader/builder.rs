//! Builder pattern for creating [`Downloader`] instances.
//!
//! ```rust
//! use braid::DownloaderBuilder;
//! use std::time::Duration;
//!
//! let downloader = DownloaderBuilder::new()
//!     .connections(8)
//!     .block_size(4 * 1024 * 1024)
//!     .timeout(Duration::from_secs(30))
//!     .build();
//! ```

use super::config::DownloaderConfig;
use super::downloader::Downloader;

use reqwest::header::{HeaderMap, HeaderValue, IntoHeaderName};
use std::time::Duration;

/// A builder used to create a [`Downloader`].
#[derive(Debug, Default)]
pub struct DownloaderBuilder {
    config: DownloaderConfig,
}

impl DownloaderBuilder {
    /// Creates a builder with the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of parallel connections (ranged mode only).
    pub fn connections(mut self, connections: usize) -> Self {
        self.config.connections = connections;
        self
    }

    /// Sets the block size handed to each connection.
    pub fn block_size(mut self, block_size: i64) -> Self {
        self.config.block_size = block_size;
        self
    }

    /// Sets the progress-report interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Sets the overall retry budget.
    ///
    /// This is a soft deadline: it caps how long transient failures are
    /// retried, but a transfer that is still moving bytes is never cut
    /// off by it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the size below which a resource is streamed on a single
    /// connection even when the server supports ranges.
    pub fn small_file_cutoff(mut self, cutoff: i64) -> Self {
        self.config.small_file_cutoff = cutoff;
        self
    }

    /// Controls TLS certificate verification (disabled by default).
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.accept_invalid_certs = accept;
        self
    }

    fn current_headers(&self) -> HeaderMap {
        self.config.headers.clone().unwrap_or_default()
    }

    /// Merges a header map into the request headers. May be called
    /// multiple times; later maps win on conflicts.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        let mut merged = self.current_headers();
        merged.extend(headers);
        self.config.headers = Some(merged);
        self
    }

    /// Adds a single request header.
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        let mut merged = self.current_headers();
        merged.insert(name, value);
        self.config.headers = Some(merged);
        self
    }

    /// Creates the [`Downloader`] with the configured options.
    pub fn build(self) -> Downloader {
        Downloader::new(self.config)
    }
}
