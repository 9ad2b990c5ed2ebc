//! One-shot content fetch.
//!
//! Small helper for callers that want a response body as text along with
//! the status code — version manifests, redirect landing pages and the
//! like. Not a download path; the body is buffered whole.

use crate::error::{classify, middleware_transport, Error, Result};
use crate::http::client::{create_http_client, HttpClientConfig};

use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use reqwest_middleware::ClientWithMiddleware;

/// Fetches `url` and returns the status code alongside the body.
///
/// The status is reported even when the fetch fails with an HTTP-level
/// error, so callers can distinguish "server said 403" from "never got an
/// answer" (status `None`).
pub async fn fetch_content(
    client: &ClientWithMiddleware,
    url: &Url,
) -> (Option<StatusCode>, Result<String>) {
    let response = match client.get(url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            let err =
                classify(None, middleware_transport(&e), None, false).unwrap_or(Error::Network);
            return (None, Err(err));
        }
    };

    let status = response.status();
    if let Some(err) = classify(Some(status), None, None, false) {
        return (Some(status), Err(err));
    }

    match response.text().await {
        Ok(text) => (Some(status), Ok(text)),
        Err(e) => {
            let err = classify(None, Some(&e), None, false).unwrap_or(Error::Network);
            (Some(status), Err(err))
        }
    }
}

/// Convenience wrapper: fetches `url` on a fresh session.
pub async fn request_content(
    url: &str,
    headers: Option<HeaderMap>,
) -> (Option<StatusCode>, Result<String>) {
    let url = match Url::parse(url) {
        Ok(url) => url,
        Err(_) => return (None, Err(Error::InvalidParam)),
    };
    let client = match create_http_client(HttpClientConfig {
        headers,
        ..Default::default()
    }) {
        Ok(client) => client,
        Err(_) => return (None, Err(Error::Runtime)),
    };
    fetch_content(&client, &url).await
}
