//! HTTP capability: session setup, probing, one-shot fetches.
//!
//! - [`client`] - client construction with tracing middleware
//! - [`probe`] - length and range-support discovery
//! - [`content`] - buffered single-request fetches

pub mod client;
pub mod content;
pub mod probe;

pub use client::{create_http_client, HttpClientConfig};
pub use content::request_content;
pub use probe::{get_file_attribute, FileAttribute, DEFAULT_PROBE_TIMEOUT};
