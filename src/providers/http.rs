//! Shared HTTP plumbing for the web providers: one pooled client, status
//! classification into [`FetchError`] kinds, and retries with exponential
//! backoff for transient failures.

use std::time::Duration;

use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use tracing::debug;

use crate::error::FetchError;
use crate::units::mask_in;

pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryConfig {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }

    /// Sum of the sleeps between `tries` attempts.
    pub fn total_delay(&self, tries: u32) -> Duration {
        (0..tries.saturating_sub(1)).map(|a| self.delay_for_attempt(a)).sum()
    }
}

pub struct HttpFetcher {
    client: Client,
    retry: RetryConfig,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Self::with_retry(timeout, RetryConfig::default())
    }

    pub fn with_retry(timeout: Duration, retry: RetryConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("forecast-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(format!("building http client: {e}")))?;
        Ok(Self { client, retry })
    }

    /// GET `url` and return the body, retrying network errors up to
    /// `max_tries` attempts. `secret` is masked in every error message.
    pub async fn get_text(
        &self,
        url: &str,
        max_tries: u32,
        secret: Option<&str>,
    ) -> Result<String, FetchError> {
        let tries = max_tries.max(1);
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt + 1 < tries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    debug!(
                        url = %mask_in(url, secret),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %mask_error(&e, secret),
                        "download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(mask_error(&e, secret)),
            }
        }
    }

    pub async fn get_json(
        &self,
        url: &str,
        max_tries: u32,
        secret: Option<&str>,
    ) -> Result<serde_json::Value, FetchError> {
        let body = self.get_text(url, max_tries, secret).await?;
        serde_json::from_str(&body)
            .map_err(|e| FetchError::MalformedResponse(format!("invalid json: {e}")))
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await.map_err(classify_transport)?;
        let status = resp.status();
        if let Some(err) = classify_status(status, retry_after(&resp)) {
            return Err(err);
        }
        resp.text().await.map_err(classify_transport)
    }
}

fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Maps an HTTP status onto an error kind; `None` means success.
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FetchError::Auth(format!("HTTP {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimit { retry_after },
        StatusCode::REQUEST_TIMEOUT => FetchError::Network(format!("HTTP {status}")),
        s if s.is_server_error() => FetchError::Network(format!("HTTP {status}")),
        _ => FetchError::MalformedResponse(format!("HTTP {status}")),
    })
}

fn classify_transport(e: reqwest::Error) -> FetchError {
    if e.is_decode() {
        FetchError::MalformedResponse(e.to_string())
    } else {
        FetchError::Network(e.to_string())
    }
}

fn mask_error(e: &FetchError, secret: Option<&str>) -> FetchError {
    match e {
        FetchError::Network(m) => FetchError::Network(mask_in(m, secret)),
        FetchError::Auth(m) => FetchError::Auth(mask_in(m, secret)),
        FetchError::MalformedResponse(m) => FetchError::MalformedResponse(mask_in(m, secret)),
        FetchError::RateLimit { retry_after } => FetchError::RateLimit {
            retry_after: *retry_after,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_delay_sums_the_gaps_between_tries() {
        let r = RetryConfig::default();
        assert_eq!(r.total_delay(0), Duration::ZERO);
        assert_eq!(r.total_delay(1), Duration::ZERO);
        assert_eq!(r.total_delay(3), Duration::from_millis(1500));
        // capped at max_delay per gap
        assert_eq!(r.total_delay(6), Duration::from_millis(500 + 1000 + 2000 + 4000 + 5000));
    }

    #[test]
    fn status_classes() {
        assert_eq!(classify_status(StatusCode::OK, None), None);
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, None),
            Some(FetchError::Auth(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, None),
            Some(FetchError::Auth(_))
        ));
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(9))),
            Some(FetchError::RateLimit {
                retry_after: Some(Duration::from_secs(9))
            })
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None),
            Some(FetchError::Network(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, None),
            Some(FetchError::MalformedResponse(_))
        ));
    }

    #[test]
    fn delays_double_and_cap() {
        let r = RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        assert_eq!(r.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(r.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(r.delay_for_attempt(10), Duration::from_millis(1000));
    }
}
