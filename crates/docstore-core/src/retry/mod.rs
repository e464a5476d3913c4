//! Backoff schedules for retried operations.
//!
//! # Key Types
//!
//! - [`BackoffStrategy`] - Core trait describing a bounded delay schedule
//! - [`ExponentialBackoff`] - Exponential backoff with jitter
//!
//! # Examples
//!
//! ```rust
//! use docstore_core::retry::{BackoffStrategy, ExponentialBackoff};
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoff::builder()
//!     .max_retries(2)
//!     .initial_delay(Duration::from_millis(50))
//!     .jitter(0.0)
//!     .build();
//!
//! assert_eq!(backoff.delay_for(1), Some(Duration::from_millis(100)));
//! assert_eq!(backoff.delay_for(2), None);
//! ```

mod exponential;
mod strategy;

pub use exponential::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use strategy::BackoffStrategy;
