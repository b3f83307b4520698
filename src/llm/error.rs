//! Error types for LLM requests, split by whether a retry can help.

use std::fmt;
use std::time::Duration;

use crate::retry::{classify_http_status, HttpFailure, RetryConfig};

/// Broad failure category for an LLM request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    RateLimited,
    ServerError,
    ClientError,
    NetworkError,
    ParseError,
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::ServerError => write!(f, "server error"),
            Self::ClientError => write!(f, "client error"),
            Self::NetworkError => write!(f, "network error"),
            Self::ParseError => write!(f, "parse error"),
        }
    }
}

/// A failed LLM request.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    /// Server-provided hint from a `Retry-After` header.
    pub retry_after: Option<Duration>,
}

impl LlmError {
    fn new(kind: LlmErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            retry_after: None,
        }
    }

    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(LlmErrorKind::RateLimited, message)
        }
    }

    pub fn network_error(message: String) -> Self {
        Self::new(LlmErrorKind::NetworkError, message)
    }

    pub fn parse_error(message: String) -> Self {
        Self::new(LlmErrorKind::ParseError, message)
    }

    /// Build an error from an unsuccessful HTTP response.
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match classify_http_status(status) {
            HttpFailure::RateLimited => Self::rate_limited(body, retry_after),
            HttpFailure::ServerError => {
                Self::new(LlmErrorKind::ServerError, format!("HTTP {status}: {body}"))
            }
            HttpFailure::ClientError => {
                Self::new(LlmErrorKind::ClientError, format!("HTTP {status}: {body}"))
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            LlmErrorKind::RateLimited | LlmErrorKind::ServerError | LlmErrorKind::NetworkError
        )
    }

    /// Backoff before the next retry; honors `Retry-After` when present.
    pub fn suggested_delay(&self, attempt: u32, config: &RetryConfig) -> Duration {
        self.retry_after
            .map(|d| d.min(config.max_delay))
            .unwrap_or_else(|| config.delay_for(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::from_status(503, String::new(), None).is_transient());
        assert!(LlmError::from_status(429, String::new(), None).is_transient());
        assert!(LlmError::network_error("reset".into()).is_transient());
        assert!(!LlmError::from_status(401, String::new(), None).is_transient());
        assert!(!LlmError::parse_error("bad json".into()).is_transient());
    }

    #[test]
    fn test_retry_after_is_capped() {
        let config = RetryConfig::default();
        let err = LlmError::rate_limited("slow down".into(), Some(Duration::from_secs(60)));
        assert_eq!(err.suggested_delay(0, &config), config.max_delay);

        let err = LlmError::network_error("reset".into());
        assert_eq!(err.suggested_delay(1, &config), config.delay_for(1));
    }
}
