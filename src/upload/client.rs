//! HTTP uploader built on the `hyper-util` legacy client.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::envelope::encode_batch;
use super::{BatchUploader, UploadReport};
use crate::config::{validate_url, UploadConfig};
use crate::error::{RelayError, Result};
use crate::source::Observation;

/// Longest single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Bounded exponential backoff for transient upload failures
///
/// `max_retries == 0` means a single attempt per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retry
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// POSTs batches as JSON to a fixed endpoint
///
/// The underlying client keeps a connection pool, so one uploader should be
/// shared for the whole process.
#[derive(Clone)]
pub struct HttpUploader {
    client: HttpsClient,
    endpoint: Uri,
    tagged: bool,
    retry: RetryPolicy,
}

impl fmt::Debug for HttpUploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpUploader")
            .field("endpoint", &self.endpoint)
            .field("tagged", &self.tagged)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HttpUploader {
    /// Create an uploader for `url`
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidEndpoint`] unless `url` is an absolute
    /// http or https URI.
    pub fn new(url: &str) -> Result<Self> {
        let endpoint = validate_url(url)?;

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client: HttpsClient = Client::builder(TokioExecutor::new()).build(https);

        Ok(Self {
            client,
            endpoint,
            tagged: false,
            retry: RetryPolicy::none(),
        })
    }

    /// Create an uploader from the `[upload]` config section
    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        Ok(Self::new(&config.url)?
            .with_tagged_observations(config.tagged_observations)
            .with_retry(RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.retry_base_delay_ms),
            }))
    }

    /// Add source kind and capture time to every uploaded entry
    pub fn with_tagged_observations(mut self, tagged: bool) -> Self {
        self.tagged = tagged;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// Issue one POST and classify the response
    async fn post_once(&self, body: Bytes) -> Result<(u16, Option<serde_json::Value>)> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(body))
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let response: http::Response<Incoming> = self
            .client
            .request(request)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::HttpStatus(status.as_u16()));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to read response body: {}", e)))?
            .to_bytes();

        let parsed = match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(status = status.as_u16(), "Upload response is not JSON: {}", e);
                None
            }
        };

        Ok((status.as_u16(), parsed))
    }
}

#[async_trait]
impl BatchUploader for HttpUploader {
    async fn send(&self, batch: Vec<Observation>) -> Result<UploadReport> {
        let body = Bytes::from(encode_batch(&batch, self.tagged)?);
        debug!(items = batch.len(), bytes = body.len(), endpoint = %self.endpoint, "Posting batch");

        let mut attempt: u32 = 0;
        loop {
            match self.post_once(body.clone()).await {
                Ok((status, response)) => {
                    match &response {
                        Some(value) => info!(status, items = batch.len(), "Upload succeeded: {}", value),
                        None => info!(status, items = batch.len(), "Upload succeeded"),
                    }
                    return Ok(UploadReport {
                        status,
                        response,
                        attempts: attempt + 1,
                    });
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        "Upload failed ({}), retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
