//! Resource length extraction from response headers.
//!
//! A ranged GET answers with `Content-Range: bytes 0-1023/4096`, where the
//! part after the slash is the full resource length; a plain GET only
//! carries `Content-Length`. These helpers prefer the former and fall back
//! to the latter, with `-1` standing for "the server did not say".

use reqwest::header::{HeaderMap, CONTENT_LENGTH};

/// Parses the total size out of a `Content-Range` header value
/// (`"bytes 0-1023/4096"` → `Some(4096)`). A `*` total or malformed value
/// yields `None`.
pub fn parse_content_range_total(value: &str) -> Option<i64> {
    let total = value.split('/').next_back()?.trim();
    total.parse::<i64>().ok().filter(|n| *n >= 0)
}

/// Extracts the resource length from `Content-Length`, `-1` when the
/// header is missing or unparsable.
pub fn content_length_from_headers(headers: &HeaderMap) -> i64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(-1)
}
