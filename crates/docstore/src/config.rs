//! Configuration for the docstore client

use crate::options::RequestOptions;
use docstore_core::retry::{BackoffStrategy, ExponentialBackoff};
use std::time::Duration;

/// Default number of retries for throttled requests.
pub const DEFAULT_MAX_THROTTLE_RETRIES: u32 = 9;

/// Default cumulative wait budget for throttled requests.
pub const DEFAULT_MAX_THROTTLE_WAIT: Duration = Duration::from_secs(30);

/// Default number of retries for transient network failures.
pub const DEFAULT_MAX_TRANSIENT_RETRIES: u32 = 3;

/// Retry limits and backoff schedules used by the policy engine.
///
/// The engine owns one of these; every per-operation policy reads it and
/// none of them can change it.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Schedule for throttled requests without a server retry-after.
    /// Its `max_retries` bounds the number of throttle retries.
    pub throttle_backoff: ExponentialBackoff,

    /// Total time an operation may spend waiting on throttles
    pub max_throttle_wait: Duration,

    /// Schedule and bound for transient network failures
    pub transient_backoff: ExponentialBackoff,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            throttle_backoff: ExponentialBackoff::builder()
                .max_retries(DEFAULT_MAX_THROTTLE_RETRIES)
                .initial_delay(Duration::from_millis(100))
                .max_delay(Duration::from_secs(5))
                .build(),
            max_throttle_wait: DEFAULT_MAX_THROTTLE_WAIT,
            transient_backoff: ExponentialBackoff::builder()
                .max_retries(DEFAULT_MAX_TRANSIENT_RETRIES)
                .initial_delay(Duration::from_millis(100))
                .max_delay(Duration::from_secs(10))
                .build(),
        }
    }
}

impl RetryOptions {
    /// Options that never retry anything except the single session reset.
    pub fn no_retries() -> Self {
        Self {
            throttle_backoff: ExponentialBackoff::builder().max_retries(0).build(),
            max_throttle_wait: Duration::ZERO,
            transient_backoff: ExponentialBackoff::builder().max_retries(0).build(),
        }
    }

    /// Set the maximum number of throttle retries.
    pub fn max_throttle_retries(mut self, retries: u32) -> Self {
        self.throttle_backoff = self.throttle_backoff.to_builder().max_retries(retries).build();
        self
    }

    /// Set the cumulative throttle wait budget.
    pub fn max_throttle_wait(mut self, wait: Duration) -> Self {
        self.max_throttle_wait = wait;
        self
    }

    /// Set the maximum number of transient failure retries.
    pub fn max_transient_retries(mut self, retries: u32) -> Self {
        self.transient_backoff = self
            .transient_backoff
            .to_builder()
            .max_retries(retries)
            .build();
        self
    }

    /// Replace the throttle backoff schedule.
    pub fn throttle_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.throttle_backoff = backoff;
        self
    }

    /// Replace the transient failure backoff schedule.
    pub fn transient_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.transient_backoff = backoff;
        self
    }

    /// Maximum number of throttle retries.
    pub fn throttle_retry_limit(&self) -> u32 {
        self.throttle_backoff.max_retries()
    }

    /// Maximum number of transient failure retries.
    pub fn transient_retry_limit(&self) -> u32 {
        self.transient_backoff.max_retries()
    }
}

/// Configuration for the docstore client.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Retry limits and schedules
    pub retry: RetryOptions,

    /// Options applied to every request unless overridden
    pub default_options: RequestOptions,

    /// Session token to start from, e.g. one persisted by a previous process
    pub initial_session_token: Option<String>,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first, if present.
    /// This will look for:
    /// - `DOCSTORE_MAX_THROTTLE_RETRIES`
    /// - `DOCSTORE_MAX_THROTTLE_WAIT_SECS`
    /// - `DOCSTORE_MAX_TRANSIENT_RETRIES`
    /// - `DOCSTORE_SESSION_TOKEN`
    /// - `DOCSTORE_CONSISTENCY_LEVEL`
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self, crate::error::Error> {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Some(retries) = env_var::<u32>("DOCSTORE_MAX_THROTTLE_RETRIES")? {
            config.retry = config.retry.max_throttle_retries(retries);
        }
        if let Some(secs) = env_var::<u64>("DOCSTORE_MAX_THROTTLE_WAIT_SECS")? {
            config.retry = config.retry.max_throttle_wait(Duration::from_secs(secs));
        }
        if let Some(retries) = env_var::<u32>("DOCSTORE_MAX_TRANSIENT_RETRIES")? {
            config.retry = config.retry.max_transient_retries(retries);
        }
        if let Ok(token) = std::env::var("DOCSTORE_SESSION_TOKEN") {
            config.initial_session_token = Some(token);
        }
        if let Some(level) = env_var("DOCSTORE_CONSISTENCY_LEVEL")? {
            config.default_options.consistency_level = Some(level);
        }

        Ok(config)
    }

    /// Merge this configuration with another, with the other taking precedence.
    pub fn merge(mut self, other: ClientConfig) -> Self {
        if other.retry != RetryOptions::default() {
            self.retry = other.retry;
        }
        self.default_options = other.default_options.merged_over(&self.default_options);
        if other.initial_session_token.is_some() {
            self.initial_session_token = other.initial_session_token;
        }
        self
    }
}

/// Parse `name` from the environment; unset is `None`, malformed is an error.
#[cfg(feature = "env")]
fn env_var<T>(name: &str) -> Result<Option<T>, crate::error::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    use crate::error::Error;

    let Ok(value) = std::env::var(name) else {
        return Ok(None);
    };
    value
        .parse()
        .map(Some)
        .map_err(|e| Error::from(anyhow::anyhow!("invalid {name}={value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ConsistencyLevel;

    #[test]
    fn test_retry_defaults() {
        let retry = RetryOptions::default();
        assert_eq!(retry.throttle_retry_limit(), DEFAULT_MAX_THROTTLE_RETRIES);
        assert_eq!(retry.transient_retry_limit(), DEFAULT_MAX_TRANSIENT_RETRIES);
        assert_eq!(retry.max_throttle_wait, Duration::from_secs(30));
    }

    #[test]
    fn test_retry_limits_keep_schedule() {
        let retry = RetryOptions::default().max_transient_retries(7);
        assert_eq!(retry.transient_retry_limit(), 7);
        assert_eq!(
            retry.transient_backoff.initial_delay(),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_merge_other_wins() {
        let base = ClientConfig {
            initial_session_token: Some("0:1#1".into()),
            ..Default::default()
        };
        let other = ClientConfig {
            retry: RetryOptions::no_retries(),
            default_options: RequestOptions::new().consistency_level(ConsistencyLevel::Strong),
            initial_session_token: None,
        };

        let merged = base.merge(other);
        assert_eq!(merged.retry, RetryOptions::no_retries());
        assert_eq!(
            merged.default_options.consistency_level,
            Some(ConsistencyLevel::Strong)
        );
        assert_eq!(merged.initial_session_token.as_deref(), Some("0:1#1"));
    }

    #[cfg(feature = "env")]
    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("DOCSTORE_MAX_THROTTLE_RETRIES", Some("4")),
                ("DOCSTORE_MAX_THROTTLE_WAIT_SECS", Some("12")),
                ("DOCSTORE_MAX_TRANSIENT_RETRIES", Some("1")),
                ("DOCSTORE_SESSION_TOKEN", Some("0:1#42")),
                ("DOCSTORE_CONSISTENCY_LEVEL", Some("eventual")),
            ],
            || {
                let config = ClientConfig::from_env().unwrap();
                assert_eq!(config.retry.throttle_retry_limit(), 4);
                assert_eq!(config.retry.max_throttle_wait, Duration::from_secs(12));
                assert_eq!(config.retry.transient_retry_limit(), 1);
                assert_eq!(config.initial_session_token.as_deref(), Some("0:1#42"));
                assert_eq!(
                    config.default_options.consistency_level,
                    Some(ConsistencyLevel::Eventual)
                );
            },
        );
    }

    #[cfg(feature = "env")]
    #[test]
    fn test_from_env_rejects_garbage() {
        temp_env::with_var("DOCSTORE_MAX_TRANSIENT_RETRIES", Some("lots"), || {
            let err = ClientConfig::from_env().unwrap_err();
            assert!(matches!(err, crate::error::Error::Other(_)));
            assert!(err.to_string().contains("DOCSTORE_MAX_TRANSIENT_RETRIES"));
        });
        temp_env::with_var("DOCSTORE_CONSISTENCY_LEVEL", Some("sometimes"), || {
            let err = ClientConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("unknown consistency level"));
        });
    }
}
