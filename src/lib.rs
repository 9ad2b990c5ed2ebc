//! Braid is a multi-connection HTTP(S) file downloader: it splits a
//! resource into blocks, fetches them on parallel range requests, and
//! checkpoints its progress so an interrupted download resumes instead of
//! starting over.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use braid::{download_file, DownloaderConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> braid::Result<()> {
//! download_file(
//!     "https://example.com/archive.zip",
//!     "downloads/archive.zip",
//!     None,
//!     DownloaderConfig::default(),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! While a download runs, `<path>.temp` holds the data and `<path>.meta`
//! the resume checkpoint; on success only `<path>` remains. Servers
//! without range support, resources of unknown length and small files are
//! streamed on a single connection automatically.
//!
//! # Module Organization
//!
//! - [`downloader`] - the `Downloader`, its builder, and `download_file`
//! - [`ranged_file`] - block allocation, positioned writes, checkpointing
//! - [`range`] - byte range and block value types
//! - [`http`] - session setup, probing, one-shot fetches
//! - [`error`] - the error taxonomy and failure classification
//! - [`utils`] - header parsing helpers

pub mod downloader;
pub mod error;
pub mod http;
pub mod range;
pub mod ranged_file;
pub mod utils;

pub use downloader::{download_file, Downloader, DownloaderBuilder, DownloaderConfig, ProgressCallback};
pub use error::{classify, Error, Result};
pub use http::{get_file_attribute, request_content, FileAttribute, HttpClientConfig};
pub use range::{Block, BlockState, Range};
pub use ranged_file::{RangedFile, DEFAULT_BLOCK_HINT};
pub use utils::content_length::{content_length_from_headers, parse_content_range_total};
