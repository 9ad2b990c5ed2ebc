//! Resource probing.
//!
//! Before splitting a download across connections the engine needs two
//! facts: how long the resource is, and whether the server honors `Range`
//! requests. A single header-only request answers both.

use crate::error::{classify, middleware_transport, Error, Result};
use crate::http::client::{create_http_client, HttpClientConfig};
use crate::utils::content_length::{content_length_from_headers, parse_content_range_total};

use reqwest::header::{HeaderMap, ACCEPT_RANGES, CONTENT_RANGE, RANGE};
use reqwest::{StatusCode, Url};
use reqwest_middleware::ClientWithMiddleware;
use std::time::Duration;
use tracing::debug;

/// Default budget for one probe request.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// What a probe learned about the resource.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAttribute {
    /// Resource length in bytes, `-1` when the server did not say.
    pub content_length: i64,
    /// Raw `Content-Range` header, when present.
    pub content_range: Option<String>,
    /// `Accept-Ranges` value; empty when the server gave no signal.
    pub accept_ranges: String,
    /// The full response header map, for callers that need more.
    pub headers: HeaderMap,
}

impl FileAttribute {
    /// True when the server advertised byte-range support.
    pub fn supports_ranges(&self) -> bool {
        !self.accept_ranges.is_empty() && self.accept_ranges != "none"
    }
}

/// Probes `url` for length and range support.
///
/// Issues a GET with `Range: bytes=0-` and reads only the headers; some
/// servers answer HEAD requests with less care than GETs, and the ranged
/// GET doubles as a range-support check. A 206 with no `Accept-Ranges`
/// header still counts as range support — the server just proved it.
pub async fn probe(
    client: &ClientWithMiddleware,
    url: &Url,
    timeout: Duration,
) -> Result<FileAttribute> {
    let response = match client
        .get(url.clone())
        .header(RANGE, "bytes=0-")
        .timeout(timeout)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            return Err(classify(None, middleware_transport(&e), None, false)
                .unwrap_or(Error::Network))
        }
    };

    let status = response.status();
    if let Some(err) = classify(Some(status), None, None, false) {
        return Err(err);
    }

    // headers only; the response is dropped without reading the body
    let headers = response.headers().clone();
    drop(response);

    let content_range = headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let mut accept_ranges = headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if accept_ranges.is_empty() && status == StatusCode::PARTIAL_CONTENT {
        accept_ranges = "bytes".to_string();
    }

    let content_length = content_range
        .as_deref()
        .and_then(parse_content_range_total)
        .unwrap_or_else(|| content_length_from_headers(&headers));

    debug!(%url, content_length, accept_ranges, "probed resource");
    Ok(FileAttribute {
        content_length,
        content_range,
        accept_ranges,
        headers,
    })
}

/// Convenience wrapper: probes `url` on a fresh session.
pub async fn get_file_attribute(
    url: &str,
    headers: Option<HeaderMap>,
    timeout: Option<Duration>,
) -> Result<FileAttribute> {
    let url = Url::parse(url).map_err(|_| Error::InvalidParam)?;
    let client = create_http_client(HttpClientConfig {
        headers,
        ..Default::default()
    })
    .map_err(|_| Error::Runtime)?;
    probe(&client, &url, timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT)).await
}
