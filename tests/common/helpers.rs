//! Shared test helpers: deterministic payloads, scratch directories, and
//! a mock server responder that speaks enough of HTTP ranges to exercise
//! the segmented download path.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use wiremock::{Request, Respond, ResponseTemplate};

/// Creates a scratch directory that cleans up after the test.
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("failed to create temporary directory")
}

/// Deterministic pseudo-random payload; any two offsets differ with high
/// probability, so misplaced block writes show up as content mismatches.
pub fn test_payload(len: usize) -> Vec<u8> {
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

/// Parses `bytes=a-b` / `bytes=a-`; the returned interval is inclusive
/// and clamped to the payload.
pub fn parse_range_header(value: &str, total: usize) -> Option<(usize, usize)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: usize = start.trim().parse().ok()?;
    let end: usize = if end.trim().is_empty() {
        total.checked_sub(1)?
    } else {
        end.trim().parse().ok()?
    };
    (start <= end && start < total).then_some((start, end.min(total - 1)))
}

fn bounded_range(request: &Request) -> bool {
    request
        .headers
        .get("range")
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.trim_end().ends_with('-'))
        .unwrap_or(false)
}

fn range_of(request: &Request, total: usize) -> Option<(usize, usize)> {
    request
        .headers
        .get("range")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range_header(v, total))
}

/// Serves a fixed payload with byte-range support, like a well-behaved
/// static file server.
pub struct RangedPayload {
    payload: Vec<u8>,
    advertise_ranges: bool,
    delay: Option<std::time::Duration>,
}

impl RangedPayload {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            advertise_ranges: true,
            delay: None,
        }
    }

    /// A server that ignores `Range` headers entirely and never
    /// advertises support.
    pub fn without_range_support(payload: Vec<u8>) -> Self {
        Self {
            payload,
            advertise_ranges: false,
            delay: None,
        }
    }

    /// Delays every response, like a slow origin.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Respond for RangedPayload {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let total = self.payload.len();
        let mut response = match range_of(request, total) {
            Some((start, end)) if self.advertise_ranges => ResponseTemplate::new(206)
                .insert_header(
                    "content-range",
                    format!("bytes {start}-{end}/{total}").as_str(),
                )
                .insert_header("accept-ranges", "bytes")
                .set_body_bytes(self.payload[start..=end].to_vec()),
            _ => {
                let full = ResponseTemplate::new(200).set_body_bytes(self.payload.clone());
                if self.advertise_ranges {
                    full.insert_header("accept-ranges", "bytes")
                } else {
                    full
                }
            }
        };
        if let Some(delay) = self.delay {
            response = response.set_delay(delay);
        }
        response
    }
}

/// Answers probes normally but fails every block fetch with the given
/// status, like an origin behind an overloaded CDN.
pub struct FailingBlocks {
    payload: Vec<u8>,
    status: u16,
}

impl FailingBlocks {
    pub fn new(payload: Vec<u8>, status: u16) -> Self {
        Self { payload, status }
    }
}

impl Respond for FailingBlocks {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if bounded_range(request) {
            return ResponseTemplate::new(self.status);
        }
        let total = self.payload.len();
        ResponseTemplate::new(206)
            .insert_header("content-range", format!("bytes 0-{}/{total}", total - 1).as_str())
            .insert_header("accept-ranges", "bytes")
            .set_body_bytes(self.payload.clone())
    }
}

/// Fails the first `failures` block fetches with the given status, then
/// behaves like [`RangedPayload`].
pub struct FlakyBlocks {
    inner: RangedPayload,
    status: u16,
    failures: usize,
    seen: AtomicUsize,
}

impl FlakyBlocks {
    pub fn new(payload: Vec<u8>, status: u16, failures: usize) -> Self {
        Self {
            inner: RangedPayload::new(payload),
            status,
            failures,
            seen: AtomicUsize::new(0),
        }
    }
}

impl Respond for FlakyBlocks {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if bounded_range(request) && self.seen.fetch_add(1, Ordering::SeqCst) < self.failures {
            return ResponseTemplate::new(self.status);
        }
        self.inner.respond(request)
    }
}
