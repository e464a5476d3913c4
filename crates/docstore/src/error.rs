//! Error types for the docstore client
//!
//! Two layers live here. [`Failure`] is the structured descriptor a transport
//! returns for one failed attempt; its [`FailureKind`] drives both the retry
//! policy and the provisioning state machine. [`Error`] is what the client
//! returns once an operation is over.

use docstore_core::error_boundary;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for docstore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Sub-status the store attaches to a 404 when the session token it was sent
/// is ahead of the replica that served the read.
pub const READ_SESSION_NOT_AVAILABLE: u32 = 1002;

/// Status category of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The addressed resource does not exist (404).
    NotFound,
    /// A resource with the same identity already exists (409).
    Conflict,
    /// The cached session token no longer matches the server's view.
    StaleSession,
    /// Request rate too large (429).
    RateLimited,
    /// Timeouts, dropped connections and retryable server faults.
    TransientNetwork,
    /// Validation, authorization or otherwise unrecoverable failures.
    Fatal,
}

impl FailureKind {
    /// `NotFound` and `Conflict` carry business meaning and are never retried
    /// by the policy engine.
    pub fn is_business_outcome(self) -> bool {
        matches!(self, Self::NotFound | Self::Conflict)
    }

    /// Whether the policy engine may retry this kind at all.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::StaleSession | Self::RateLimited | Self::TransientNetwork
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::StaleSession => "stale session",
            Self::RateLimited => "rate limited",
            Self::TransientNetwork => "transient network failure",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Structured description of one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    /// Status category
    pub kind: FailureKind,
    /// Human readable message from the store or transport
    pub message: String,
    /// Status code, when the failure came from the store
    pub status: Option<u16>,
    /// Store sub-status code
    pub sub_status: Option<u32>,
    /// Server suggested wait before retrying
    pub retry_after: Option<Duration>,
}

impl Failure {
    /// Create a failure of the given kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            sub_status: None,
            retry_after: None,
        }
    }

    /// Resource not found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message).with_status(404)
    }

    /// Resource already exists.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Conflict, message).with_status(409)
    }

    /// Session token not yet available on the serving replica.
    pub fn stale_session(message: impl Into<String>) -> Self {
        Self::new(FailureKind::StaleSession, message)
            .with_status(404)
            .with_sub_status(READ_SESSION_NOT_AVAILABLE)
    }

    /// Request throttled, optionally with a server supplied wait.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(FailureKind::RateLimited, "request rate is large").with_status(429)
        }
    }

    /// Timeout, connection reset, or retryable server fault.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientNetwork, message)
    }

    /// Unrecoverable failure.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Fatal, message)
    }

    /// Attach a status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a sub-status code.
    pub fn with_sub_status(mut self, sub_status: u32) -> Self {
        self.sub_status = Some(sub_status);
        self
    }

    /// Attach a server suggested retry-after.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Classify a store response status into a failure.
    ///
    /// Transports call this after receiving a non-success status so the
    /// policy engine never has to look at raw codes.
    pub fn from_status(
        status: u16,
        sub_status: Option<u32>,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        let kind = match (status, sub_status) {
            (404, Some(READ_SESSION_NOT_AVAILABLE)) => FailureKind::StaleSession,
            (404, _) => FailureKind::NotFound,
            (409, _) => FailureKind::Conflict,
            (429, _) => FailureKind::RateLimited,
            (408 | 410 | 449 | 500 | 503, _) => FailureKind::TransientNetwork,
            _ => FailureKind::Fatal,
        };

        Self {
            kind,
            message: message.into(),
            status: Some(status),
            sub_status,
            retry_after,
        }
    }
}

error_boundary!(serde_json::Error => Failure, |e| {
    Failure::fatal(format!("malformed payload: {e}"))
});

/// Main error type for the docstore client.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation ended with a terminal failure.
    #[error("Operation failed: {0}")]
    Failed(Failure),

    /// The caller cancelled the operation before it finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// A resource identity or address was rejected.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing required configuration.
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    /// Other errors not covered by specific variants.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// The failure carried by [`Error::Failed`].
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Status category of the carried failure.
    pub fn kind(&self) -> Option<FailureKind> {
        self.failure().map(|f| f.kind)
    }

    /// Whether this error represents a resource that does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(FailureKind::NotFound)
    }

    /// Whether the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Self::Failed(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(404, None, FailureKind::NotFound)]
    #[case(404, Some(READ_SESSION_NOT_AVAILABLE), FailureKind::StaleSession)]
    #[case(409, None, FailureKind::Conflict)]
    #[case(429, None, FailureKind::RateLimited)]
    #[case(408, None, FailureKind::TransientNetwork)]
    #[case(410, None, FailureKind::TransientNetwork)]
    #[case(449, None, FailureKind::TransientNetwork)]
    #[case(503, None, FailureKind::TransientNetwork)]
    #[case(400, None, FailureKind::Fatal)]
    #[case(401, None, FailureKind::Fatal)]
    #[case(403, None, FailureKind::Fatal)]
    #[case(412, None, FailureKind::Fatal)]
    fn test_status_classification(
        #[case] status: u16,
        #[case] sub_status: Option<u32>,
        #[case] expected: FailureKind,
    ) {
        let failure = Failure::from_status(status, sub_status, "boom", None);
        assert_eq!(failure.kind, expected);
        assert_eq!(failure.status, Some(status));
    }

    #[test]
    fn test_retry_after_is_preserved() {
        let failure =
            Failure::from_status(429, None, "throttled", Some(Duration::from_millis(250)));
        assert_eq!(failure.retry_after, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_business_outcomes_are_not_retryable() {
        for kind in [FailureKind::NotFound, FailureKind::Conflict] {
            assert!(kind.is_business_outcome());
            assert!(!kind.is_retryable());
        }
        assert!(!FailureKind::Fatal.is_retryable());
        assert!(FailureKind::StaleSession.is_retryable());
    }

    #[test]
    fn test_serde_boundary_yields_fatal() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let failure: Failure = err.into();
        assert_eq!(failure.kind, FailureKind::Fatal);
        assert!(failure.message.starts_with("malformed payload"));
    }

    #[test]
    fn test_error_exposes_failure() {
        let err = Error::from(Failure::not_found("dbs/a"));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Operation failed: not found: dbs/a");
        assert!(Error::Cancelled.failure().is_none());
    }
}
