//! Remote content retrieval with retry and exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use covariate_common::{CovResult, CovariateError};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};

/// Retry and timeout settings for downloads.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    pub initial_retry_delay: Duration,
    /// Maximum retry delay
    pub max_retry_delay: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(60),
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> CovResult<()> {
        if self.request_timeout.is_zero() {
            return Err(CovariateError::InvalidArgument(
                "request_timeout must be > 0".to_string(),
            ));
        }
        if self.initial_retry_delay > self.max_retry_delay {
            return Err(CovariateError::InvalidArgument(
                "initial_retry_delay exceeds max_retry_delay".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(
            self.initial_retry_delay.saturating_mul(factor),
            self.max_retry_delay,
        )
    }
}

/// Source of remote bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> CovResult<Bytes>;
}

/// Outcome of one HTTP attempt.
enum Attempt {
    Done(Bytes),
    Retry(String),
    Fail(String),
}

/// `reqwest`-backed fetcher.
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> CovResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| CovariateError::Download(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn attempt(&self, url: &str) -> Attempt {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return Attempt::Retry(e.to_string()),
        };

        let status = response.status();
        if status.is_success() {
            return match response.bytes().await {
                Ok(body) => Attempt::Done(body),
                Err(e) => Attempt::Retry(e.to_string()),
            };
        }

        let message = format!("HTTP error: {}", status);
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Attempt::Retry(message)
        } else {
            Attempt::Fail(message)
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self, url), fields(url = %redact(url)))]
    async fn fetch(&self, url: &str) -> CovResult<Bytes> {
        let mut retry_count = 0;

        loop {
            match self.attempt(url).await {
                Attempt::Done(body) => {
                    info!(bytes = body.len(), retries = retry_count, "Download completed");
                    return Ok(body);
                }
                Attempt::Fail(message) => {
                    return Err(CovariateError::Download(message));
                }
                Attempt::Retry(message) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        return Err(CovariateError::Download(format!(
                            "failed after {} retries: {}",
                            self.config.max_retries, message
                        )));
                    }

                    let delay = self.config.backoff(retry_count);
                    warn!(
                        error = %message,
                        retry = retry_count,
                        max_retries = self.config.max_retries,
                        delay_secs = delay.as_secs(),
                        "Download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    debug!(retry = retry_count, "Retrying download");
                }
            }
        }
    }
}

/// Strip the query string so API keys stay out of the logs.
pub(crate) fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
