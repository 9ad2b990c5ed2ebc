//! Download orchestration: the [`Downloader`], its builder, and the
//! one-call convenience entry point.
//!
//! - `downloader` - the orchestrator (mode selection, workers, supervisor)
//! - `builder` - [`DownloaderBuilder`] for configuring a [`Downloader`]
//! - `config` - configuration structure and callback types

pub mod builder;
pub mod config;
pub mod downloader;

pub use builder::DownloaderBuilder;
pub use config::{DownloaderConfig, ProgressCallback};
pub use downloader::Downloader;

use crate::error::Result;
use std::path::Path;

/// Downloads `url` to `path` with the given preferences.
///
/// ```rust,no_run
/// use braid::{download_file, DownloaderConfig};
///
/// # async fn example() -> braid::Result<()> {
/// download_file(
///     "https://example.com/big.iso",
///     "downloads/big.iso",
///     Some(Box::new(|total, processed| {
///         println!("{processed}/{total}");
///         true
///     })),
///     DownloaderConfig::default(),
/// )
/// .await
/// # }
/// ```
pub async fn download_file(
    url: &str,
    path: impl AsRef<Path>,
    progress: Option<ProgressCallback>,
    config: DownloaderConfig,
) -> Result<()> {
    Downloader::new(config).download(url, path, progress).await
}
