//! Structured logging for operation attempts
//!
//! Every attempt the executor issues is logged through this layer so the
//! field names stay consistent: `activity_id` ties the attempts of one
//! logical operation together, `attempt` counts from 1.

use crate::address::ResourceAddress;
use crate::error::Failure;
use crate::policy::RetryDecision;
use crate::transport::OperationKind;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Attempt metadata for structured logging
#[derive(Debug, Clone)]
pub struct AttemptMetadata {
    /// Activity id of the logical operation
    pub activity_id: Uuid,
    /// Operation performed
    pub operation: OperationKind,
    /// Target (or parent, for creates)
    pub address: String,
    /// 1-based attempt number within the operation
    pub attempt: u32,
}

impl AttemptMetadata {
    /// Create new attempt metadata
    pub fn new(
        activity_id: Uuid,
        operation: OperationKind,
        address: &ResourceAddress,
        attempt: u32,
    ) -> Self {
        Self {
            activity_id,
            operation,
            address: address.to_string(),
            attempt,
        }
    }

    /// Log attempt being issued
    pub fn log_attempt(&self) {
        debug!(
            activity_id = %self.activity_id,
            operation = %self.operation,
            address = %self.address,
            attempt = self.attempt,
            "Issuing attempt"
        );
    }

    /// Log successful attempt
    pub fn log_success(&self, elapsed: Duration) {
        info!(
            activity_id = %self.activity_id,
            operation = %self.operation,
            address = %self.address,
            attempt = self.attempt,
            elapsed_ms = elapsed.as_millis(),
            "Attempt succeeded"
        );
    }

    /// Log failed attempt that ends the operation
    pub fn log_failure(&self, failure: &Failure, elapsed: Duration) {
        warn!(
            activity_id = %self.activity_id,
            operation = %self.operation,
            address = %self.address,
            attempt = self.attempt,
            elapsed_ms = elapsed.as_millis(),
            kind = %failure.kind,
            status = failure.status,
            error = %failure.message,
            "Attempt failed"
        );
    }

    /// Log failed attempt that will be retried
    pub fn log_retry(&self, failure: &Failure, decision: &RetryDecision) {
        warn!(
            activity_id = %self.activity_id,
            operation = %self.operation,
            address = %self.address,
            attempt = self.attempt,
            kind = %failure.kind,
            backoff_ms = decision.backoff.as_millis(),
            side_effect = ?decision.side_effect,
            "Retrying after failure"
        );
    }
}

/// Timer for measuring attempt duration
pub struct AttemptTimer {
    start: Instant,
}

impl AttemptTimer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Time elapsed since start
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Install a `tracing-subscriber` fmt subscriber filtered by `RUST_LOG`.
///
/// Defaults to `docstore=info` when `RUST_LOG` is unset. Calling it more than
/// once is harmless.
#[cfg(feature = "trace")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docstore=info"));
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
    {
        tracing::debug!(error = %e, "Global subscriber already set, keeping it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_renders_address() {
        let address = ResourceAddress::collection("db", "orders").unwrap();
        let meta = AttemptMetadata::new(Uuid::nil(), OperationKind::Read, &address, 2);
        assert_eq!(meta.address, "dbs/db/colls/orders");
        assert_eq!(meta.attempt, 2);
    }

    #[cfg(feature = "trace")]
    #[test]
    fn test_init_tracing_twice_keeps_first_subscriber() {
        init_tracing();
        init_tracing();
        tracing::info!("still logging");
    }
}
