//! Shared HTTP plumbing for the remote compressors.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Client, StatusCode};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// Leading bytes of every PDF file
const PDF_MAGIC: &[u8] = b"%PDF";

/// Retry budget for one remote operation.
#[derive(Debug, Clone, Copy)]
pub(super) struct Retry {
    pub count: u32,
    pub delay: Duration,
}

/// A failed attempt and whether another attempt may succeed.
#[derive(Debug)]
pub(super) struct Failure {
    pub error: Error,
    pub retryable: bool,
}

impl Failure {
    pub const fn retry(error: Error) -> Self {
        Self { error, retryable: true }
    }

    pub const fn fatal(error: Error) -> Self {
        Self {
            error,
            retryable: false,
        }
    }

    /// Classify a non-success HTTP status. Server errors are retried.
    pub fn status(status: StatusCode, body: &str) -> Self {
        let error = Error::CompressionRequest(format!("HTTP {status}: {}", snippet(body)));
        if status.is_server_error() {
            Self::retry(error)
        } else {
            Self::fatal(error)
        }
    }
}

impl From<reqwest::Error> for Failure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::retry(Error::CompressionTimeout)
        } else if e.is_connect() || e.is_request() {
            Self::retry(Error::CompressionRequest(e.to_string()))
        } else if e.is_decode() {
            Self::fatal(Error::CompressionInvalidResponse(e.to_string()))
        } else {
            Self::fatal(Error::CompressionRequest(e.to_string()))
        }
    }
}

/// Build the HTTP client with the configured timeout
pub(super) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::CompressionRequest(format!("Failed to create HTTP client: {e}")))
}

/// Run `attempt` until it succeeds, fails fatally or the budget runs out.
pub(super) async fn with_retry<T, F, Fut>(retry: Retry, label: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, Failure>>,
{
    let count = retry.count.max(1);
    let mut last_error = None;

    for n in 0..count {
        debug!("{} attempt {}/{}", label, n + 1, count);

        match attempt().await {
            Ok(value) => return Ok(value),
            Err(failure) if failure.retryable => {
                warn!("{} failed: {}", label, failure.error);
                last_error = Some(failure.error);
            }
            Err(failure) => {
                warn!("{} failed: {}", label, failure.error);
                return Err(failure.error);
            }
        }

        if n + 1 < count {
            tokio::time::sleep(retry.delay).await;
        }
    }

    error!("{} failed after {} attempts", label, count);
    Err(last_error.unwrap_or_else(|| Error::CompressionRequest(format!("{label}: no attempts made"))))
}

/// True when the response declares a PDF body (parameters ignored).
pub(super) fn is_pdf_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/pdf"))
}

/// Reject bodies that are not PDFs, whatever the headers claim.
pub(super) fn ensure_pdf(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if bytes.starts_with(PDF_MAGIC) {
        Ok(bytes)
    } else {
        Err(Error::CompressionInvalidResponse(format!(
            "Body is not a PDF ({} bytes, starts with {:?})",
            bytes.len(),
            String::from_utf8_lossy(&bytes[..bytes.len().min(8)])
        )))
    }
}

fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map_or(body.len(), |(i, _)| i);
    body[..end].trim()
}
