//! HTTP session setup.
//!
//! Every download connection runs on a client built here: reqwest wrapped
//! in `reqwest-middleware` with tracing instrumentation. Retrying is *not*
//! layered in as middleware — the engine decides per error kind whether a
//! request is worth repeating, and a transparent backoff layer underneath
//! would hide exactly the failures that decision needs to see.

use reqwest::header::HeaderMap;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use std::time::Duration;

/// Configuration for one HTTP session.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Default headers applied to every request.
    pub headers: Option<HeaderMap>,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Abort a transfer when no data arrives for this long. Stands in for
    /// a low-speed cutoff: a connection that stalls outright is dropped
    /// and classified as a network error.
    pub read_timeout: Duration,
    /// TCP keepalive interval for pooled connections.
    pub tcp_keepalive: Duration,
    /// Skip TLS certificate verification. Defaults to true: the engine
    /// verifies nothing about the peer, it only moves bytes.
    pub accept_invalid_certs: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            headers: None,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(8),
            tcp_keepalive: Duration::from_secs(60),
            accept_invalid_certs: true,
        }
    }
}

/// Creates an HTTP client with tracing middleware.
pub fn create_http_client(
    config: HttpClientConfig,
) -> Result<ClientWithMiddleware, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .tcp_keepalive(config.tcp_keepalive)
        .danger_accept_invalid_certs(config.accept_invalid_certs);

    if let Some(headers) = config.headers {
        builder = builder.default_headers(headers);
    }

    let inner = builder.build()?;
    let client = ClientBuilder::new(inner)
        .with(TracingMiddleware::default())
        .build();

    Ok(client)
}
