//! Bounded retry policy shared by the outbound HTTP clients.

use std::time::Duration;

/// Failure classes for an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpFailure {
    /// 429: the remote side is throttling us.
    RateLimited,
    /// 5xx and gateway timeouts.
    ServerError,
    /// Remaining 4xx; retrying will not help.
    ClientError,
}

/// Map an unsuccessful HTTP status onto a failure class.
pub fn classify_http_status(status: u16) -> HttpFailure {
    match status {
        429 => HttpFailure::RateLimited,
        408 | 500..=599 => HttpFailure::ServerError,
        _ => HttpFailure::ClientError,
    }
}

/// How many times, and how patiently, to retry a transient failure.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Overall wall-clock ceiling for one attempt sequence.
    pub max_retry_duration: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            max_retry_duration: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff for the given zero-based retry index.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_http_status() {
        assert_eq!(classify_http_status(429), HttpFailure::RateLimited);
        assert_eq!(classify_http_status(503), HttpFailure::ServerError);
        assert_eq!(classify_http_status(408), HttpFailure::ServerError);
        assert_eq!(classify_http_status(401), HttpFailure::ClientError);
        assert_eq!(classify_http_status(404), HttpFailure::ClientError);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_millis(250));
        assert_eq!(config.delay_for(1), Duration::from_millis(500));
        assert_eq!(config.delay_for(2), Duration::from_secs(1));
        assert_eq!(config.delay_for(10), Duration::from_secs(2));
        assert_eq!(config.delay_for(u32::MAX), Duration::from_secs(2));
    }
}
