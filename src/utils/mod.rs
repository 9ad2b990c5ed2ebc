//! Shared helpers.

pub mod content_length;

pub use content_length::{content_length_from_headers, parse_content_range_total};
