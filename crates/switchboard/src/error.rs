//! Error taxonomy shared by the orchestration layer.
//!
//! Every failure the core can produce falls into one of five kinds:
//!
//! - validation: malformed or missing input, never retried
//! - timeout: a deadline elapsed before the provider answered
//! - rate limit: the provider asked us to slow down
//! - provider: any other upstream failure, the only transient kind
//! - configuration: credentials or environment are missing
//!
//! The HTTP layer maps [`ErrorKind`] onto status codes; the retry layer
//! consults [`Retryable::is_transient`].

use std::time::Duration;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("timed out: {message}")]
    Timeout { message: String },

    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("provider error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Provider { status: Option<u16>, message: String },

    #[error("not configured: {0}")]
    Configuration(String),

    #[error("stream failed: {0}")]
    Stream(#[from] StreamError),
}

/// Failures raised while normalizing a provider stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("chunk is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed stream part {line:?}: {reason}")]
    MalformedPart { line: String, reason: String },

    #[error("provider reported an error mid-stream: {0}")]
    ProviderReported(String),

    #[error("upstream transport error: {0}")]
    Upstream(String),

    #[error("stream exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Timeout,
    RateLimit,
    Provider,
    Configuration,
}

impl ErrorKind {
    /// Stable machine-readable name, used as the `error` field of HTTP
    /// error bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "invalid_request",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimit => "rate_limited",
            ErrorKind::Provider => "provider_error",
            ErrorKind::Configuration => "not_configured",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Error::Timeout {
            message: message.into(),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Error::Provider {
            status: None,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::RateLimit { .. } => ErrorKind::RateLimit,
            Error::Provider { .. } | Error::Stream(_) => ErrorKind::Provider,
            Error::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Build an error from a non-success upstream HTTP status.
    ///
    /// 429 becomes [`Error::RateLimit`], 408/504 become [`Error::Timeout`],
    /// 401/403 mean the configured credentials were rejected, 400/422 mean
    /// the request itself was bad. Everything else is a provider error.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            body.trim().to_string()
        };
        match status {
            429 => Error::RateLimit {
                message,
                retry_after,
            },
            408 | 504 => Error::Timeout { message },
            401 | 403 => Error::Configuration(format!("credentials rejected: {message}")),
            400 | 422 => Error::Validation(message),
            _ => Error::Provider {
                status: Some(status),
                message,
            },
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Error::timeout(format!("request timed out: {err}"));
        }
        Error::Provider {
            status: err.status().map(|s| s.as_u16()),
            message: format!("request failed: {err}"),
        }
    }
}

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for Error {
    /// Only provider-side failures are worth repeating. Timeouts and rate
    /// limits are surfaced to the caller instead of being hammered.
    fn is_transient(&self) -> bool {
        matches!(self, Error::Provider { .. } | Error::Stream(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            Error::from_status(429, "slow down", None).kind(),
            ErrorKind::RateLimit
        );
        assert_eq!(Error::from_status(504, "", None).kind(), ErrorKind::Timeout);
        assert_eq!(
            Error::from_status(401, "bad key", None).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            Error::from_status(400, "bad body", None).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            Error::from_status(502, "bad gateway", None).kind(),
            ErrorKind::Provider
        );
    }

    #[test]
    fn rate_limit_keeps_retry_after() {
        let err = Error::from_status(429, "", Some(Duration::from_secs(7)));
        match err {
            Error::RateLimit {
                message,
                retry_after,
            } => {
                assert_eq!(message, "HTTP 429");
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn only_provider_failures_are_transient() {
        assert!(Error::provider("boom").is_transient());
        assert!(Error::Stream(StreamError::Upstream("reset".into())).is_transient());
        assert!(!Error::validation("empty").is_transient());
        assert!(!Error::timeout("slow").is_transient());
        assert!(!Error::configuration("no key").is_transient());
        assert!(!Error::from_status(429, "", None).is_transient());
    }

    #[test]
    fn provider_display_includes_status() {
        let err = Error::from_status(503, "overloaded", None);
        assert_eq!(err.to_string(), "provider error (HTTP 503): overloaded");
        assert_eq!(Error::provider("x").to_string(), "provider error: x");
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(ErrorKind::Validation.as_str(), "invalid_request");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
        assert_eq!(ErrorKind::RateLimit.as_str(), "rate_limited");
        assert_eq!(ErrorKind::Configuration.as_str(), "not_configured");
    }
}
