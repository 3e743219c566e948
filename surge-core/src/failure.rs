use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;

/// Classified cause of a failed request.
///
/// Variants are declared in tie-break order: when two kinds are equally frequent, the one
/// declared first wins.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    RateLimited,
    Unauthorized,
    ConnectionPoolExhausted,
    Timeout,
    ServerError,
    ConnectionError,
    Unknown,
}

impl FailureKind {
    pub const ALL: [FailureKind; 7] = [
        FailureKind::RateLimited,
        FailureKind::Unauthorized,
        FailureKind::ConnectionPoolExhausted,
        FailureKind::Timeout,
        FailureKind::ServerError,
        FailureKind::ConnectionError,
        FailureKind::Unknown,
    ];

    /// Best-effort classification of an opaque error message.
    ///
    /// Matching is case-insensitive and checks, in order: authentication, rate limiting, pool
    /// exhaustion, timeouts, 5xx status codes and finally generic connection failures.
    pub fn classify(message: &str) -> Self {
        let msg = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

        if has(&["401", "unauthorized"]) {
            FailureKind::Unauthorized
        } else if has(&["429", "too many requests", "rate limit"]) {
            FailureKind::RateLimited
        } else if has(&["connection pool", "pool is full"]) {
            FailureKind::ConnectionPoolExhausted
        } else if has(&["timeout", "timed out"]) {
            FailureKind::Timeout
        } else if has(&["500", "502", "503", "504"]) {
            FailureKind::ServerError
        } else if has(&["connection", "refused"]) {
            FailureKind::ConnectionError
        } else {
            FailureKind::Unknown
        }
    }

    /// Classification from an HTTP status code of a failed response.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => FailureKind::Unauthorized,
            408 => FailureKind::Timeout,
            429 => FailureKind::RateLimited,
            500..=599 => FailureKind::ServerError,
            _ => FailureKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate-limited",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::ConnectionPoolExhausted => "connection-pool-exhausted",
            FailureKind::Timeout => "timeout",
            FailureKind::ServerError => "server-error",
            FailureKind::ConnectionError => "connection-error",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed request as reported by a request operation.
///
/// Prefer [`Failure::new`] or [`Failure::status`] when the transport knows what went wrong.
/// Any [`std::error::Error`] converts into a `Failure` by classifying its message chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    kind: FailureKind,
    message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::new(
            FailureKind::from_status(status),
            format!("HTTP status {status}"),
        )
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: FailureKind::classify(&message),
            message,
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl<E> From<E> for Failure
where
    E: StdError,
{
    fn from(err: E) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        Self::from_message(message)
    }
}
