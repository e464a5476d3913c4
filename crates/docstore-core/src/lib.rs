#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Core abstractions for the docstore client crates.
//!
//! This crate holds the pieces that do not depend on the resource model:
//!
//! - **Backoff schedules** via the [`BackoffStrategy`](retry::BackoffStrategy) trait
//!   - Exponential backoff with jitter and a max-delay cap
//!   - Bounded retry counts, exhausted schedules yield `None`
//! - **Declarative error boundaries** via the `error_boundary!` macro
//!
//! # Examples
//!
//! ```rust
//! use docstore_core::prelude::*;
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoff::builder()
//!     .max_retries(3)
//!     .initial_delay(Duration::from_millis(100))
//!     .jitter(0.0)
//!     .build();
//!
//! assert_eq!(backoff.delay_for(0), Some(Duration::from_millis(100)));
//! assert_eq!(backoff.delay_for(3), None);
//! ```

pub mod boundary;
pub mod retry;

/// Convenient re-exports of commonly used items.
pub mod prelude {
    pub use crate::error_boundary;
    pub use crate::retry::{BackoffStrategy, ExponentialBackoff, ExponentialBackoffBuilder};
}
