//! HTTP retrieval with bounded retries.

use crate::config::SourcingSettings;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cannot build HTTP client: {0}")]
    Client(String),
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Timeouts, connection failures, 5xx, 408 and 429 are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            FetchError::Client(_) | FetchError::Exhausted { .. } => false,
        }
    }
}

/// One GET attempt returning the response body.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<String, FetchError>;
}

/// Blocking `reqwest` client with a per-request timeout.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("repayment-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = self.client.get(url).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(transport)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &SourcingSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Wait before retry number `retry` (1-based): `base × 2^(retry−1)`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&SourcingSettings::default())
    }
}

/// A client paired with the retry policy sources fetch through.
pub struct Fetcher<'a> {
    client: &'a dyn HttpClient,
    policy: RetryPolicy,
}

impl<'a> Fetcher<'a> {
    pub fn new(client: &'a dyn HttpClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn get(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 1;
        loop {
            match self.client.get(url) {
                Ok(body) => {
                    log::debug!("fetched {url} ({} bytes, attempt {attempt})", body.len());
                    return Ok(body);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= self.policy.max_attempts => {
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        last: Box::new(err),
                    })
                }
                Err(err) => {
                    let delay = self.policy.delay_for(attempt);
                    log::warn!(
                        "attempt {attempt}/{} for {url} failed: {err}; retrying in {delay:?}",
                        self.policy.max_attempts
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<Result<String, FetchError>>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<String, FetchError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
            }
        }

        fn remaining(&self) -> usize {
            self.replies.lock().unwrap().len()
        }
    }

    impl HttpClient for Scripted {
        fn get(&self, _url: &str) -> Result<String, FetchError> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(FetchError::Client("script exhausted".into())))
        }
    }

    fn status(code: u16) -> Result<String, FetchError> {
        Err(FetchError::Status {
            url: "u".into(),
            status: code,
        })
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(3000),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(3000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(3000));
    }

    #[test]
    fn test_retries_then_succeeds() {
        let client = Scripted::new(vec![status(503), status(429), Ok("body".into())]);
        let fetcher = Fetcher::new(&client, RetryPolicy::immediate(3));
        assert_eq!(fetcher.get("u").unwrap(), "body");
    }

    #[test]
    fn test_gives_up_after_cap() {
        let client = Scripted::new(vec![status(500), status(500), status(500), Ok("late".into())]);
        let fetcher = Fetcher::new(&client, RetryPolicy::immediate(3));
        let err = fetcher.get("u").unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
        assert_eq!(client.remaining(), 1);
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let client = Scripted::new(vec![status(404), Ok("never".into())]);
        let fetcher = Fetcher::new(&client, RetryPolicy::immediate(3));
        assert!(matches!(fetcher.get("u"), Err(FetchError::Status { status: 404, .. })));
        assert_eq!(client.remaining(), 1);
    }
}
