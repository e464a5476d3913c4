//! The backoff strategy trait.

use std::time::Duration;

/// A bounded schedule of delays between retries.
///
/// Implementations decide how long to wait after the `n`th failure and how
/// many retries are allowed in total. They hold no per-operation state: the
/// caller tracks the attempt number and asks the schedule for the next delay.
///
/// # Examples
///
/// ```rust
/// use docstore_core::retry::BackoffStrategy;
/// use std::time::Duration;
///
/// struct Fixed(Duration, u32);
///
/// impl BackoffStrategy for Fixed {
///     fn next_delay(&self, _attempt: u32) -> Option<Duration> {
///         Some(self.0)
///     }
///
///     fn max_retries(&self) -> u32 {
///         self.1
///     }
/// }
///
/// let fixed = Fixed(Duration::from_secs(1), 2);
/// assert_eq!(fixed.delay_for(1), Some(Duration::from_secs(1)));
/// assert_eq!(fixed.delay_for(2), None);
/// ```
pub trait BackoffStrategy: Send + Sync {
    /// Calculate the delay before the next retry attempt.
    ///
    /// `attempt` is 0-indexed: `next_delay(0)` is the wait between the
    /// initial attempt and the first retry. This ignores `max_retries`;
    /// use [`delay_for`](Self::delay_for) for the bounded schedule.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Maximum number of retries after the initial attempt.
    ///
    /// With `max_retries() == 3` an operation runs at most 4 times.
    fn max_retries(&self) -> u32;

    /// Delay before retry number `attempt`, or `None` once the schedule is
    /// exhausted.
    fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries() {
            return None;
        }
        self.next_delay(attempt)
    }
}
