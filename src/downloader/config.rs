//! Configuration and callback types for the downloader.

use crate::ranged_file::DEFAULT_BLOCK_HINT;

use reqwest::header::HeaderMap;
use std::time::Duration;

/// Progress callback: `(total_bytes, processed_bytes) -> continue?`.
///
/// `total_bytes` is 0 while the resource length is unknown. Returning
/// `false` requests cancellation; the download then finishes with
/// [`Error::OperationInterrupted`](crate::Error::OperationInterrupted)
/// and leaves its on-disk state behind for a later resume.
pub type ProgressCallback = Box<dyn Fn(i64, i64) -> bool + Send + Sync>;

/// Default number of parallel connections.
pub const DEFAULT_CONNECTIONS: usize = 4;

/// Default progress-report interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Default overall retry budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Resources below this size are streamed on a single connection even
/// when the server supports ranges; the bookkeeping would cost more than
/// the parallelism buys.
pub const DEFAULT_SMALL_FILE_CUTOFF: i64 = 10 * 1024 * 1024;

/// Configuration for a [`Downloader`](crate::Downloader).
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Number of parallel connections in ranged mode.
    pub connections: usize,
    /// Block size handed to each connection, in bytes.
    pub block_size: i64,
    /// How often the supervisor reports progress and checks for
    /// cancellation.
    pub interval: Duration,
    /// Overall budget for retrying transient failures. This is a soft
    /// limit: it stops further retries, it does not abort a transfer that
    /// is still making progress.
    pub timeout: Duration,
    /// Below this resource size the engine streams on one connection.
    pub small_file_cutoff: i64,
    /// Extra request headers, passed through verbatim.
    pub headers: Option<HeaderMap>,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            connections: DEFAULT_CONNECTIONS,
            block_size: DEFAULT_BLOCK_HINT,
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            small_file_cutoff: DEFAULT_SMALL_FILE_CUTOFF,
            headers: None,
            accept_invalid_certs: true,
        }
    }
}
