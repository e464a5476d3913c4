//! Retry policy engine.
//!
//! The [`RetryPolicyEngine`] is shared by every operation a client issues. It
//! owns the retry configuration and the [`SessionContainer`], and hands out a
//! fresh [`RequestRetryPolicy`] per logical operation.
//!
//! Adjudication itself is a pure function, [`adjudicate`], over an immutable
//! [`RetryState`]: it takes the state before a failure and returns the
//! decision together with the state after it. The per-operation policy is a
//! thin holder that threads that state from one failure to the next.
//!
//! | Failure            | Decision                                              |
//! |--------------------|-------------------------------------------------------|
//! | `StaleSession`     | retry once per operation, resetting the session token |
//! | `RateLimited`      | retry after server retry-after, else exponential      |
//! | `TransientNetwork` | retry with exponential backoff                        |
//! | `NotFound`         | never retried                                         |
//! | `Conflict`         | never retried                                         |
//! | `Fatal`            | never retried                                         |

use crate::config::RetryOptions;
use crate::error::{Failure, FailureKind};
use crate::session::{ConsistencyContext, SessionContainer};
use docstore_core::retry::BackoffStrategy;
use std::sync::Arc;
use std::time::Duration;

/// Side effect a decision asks the caller to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Nothing to do
    None,
    /// Clear the cached session token before the next attempt
    ResetSessionToken,
}

/// Outcome of consulting the policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Whether another attempt may be issued
    pub should_retry: bool,
    /// How long to wait before that attempt
    pub backoff: Duration,
    /// Shared state change to apply before retrying
    pub side_effect: SideEffect,
}

impl RetryDecision {
    /// Terminal decision.
    pub fn stop() -> Self {
        Self {
            should_retry: false,
            backoff: Duration::ZERO,
            side_effect: SideEffect::None,
        }
    }

    /// Retry after `backoff`.
    pub fn retry_after(backoff: Duration) -> Self {
        Self {
            should_retry: true,
            backoff,
            side_effect: SideEffect::None,
        }
    }

    /// Retry immediately after resetting the session token.
    pub fn reset_session() -> Self {
        Self {
            should_retry: true,
            backoff: Duration::ZERO,
            side_effect: SideEffect::ResetSessionToken,
        }
    }
}

/// Per-operation retry bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Failed attempts seen so far
    pub attempts: u32,
    /// Throttle retries granted so far
    pub throttle_retries: u32,
    /// Transient failure retries granted so far
    pub transient_retries: u32,
    /// Total backoff granted for throttles
    pub throttle_wait: Duration,
    /// Whether the session token was already reset during this operation
    pub session_reset: bool,
}

/// Decide whether to retry after `failure`, given the state before it.
///
/// Returns the decision and the state to use for the next failure. Never
/// touches shared state.
pub fn adjudicate(
    options: &RetryOptions,
    state: RetryState,
    failure: &Failure,
) -> (RetryDecision, RetryState) {
    let mut next = RetryState {
        attempts: state.attempts + 1,
        ..state
    };

    let decision = match failure.kind {
        FailureKind::NotFound | FailureKind::Conflict | FailureKind::Fatal => RetryDecision::stop(),

        FailureKind::StaleSession => {
            if state.session_reset {
                RetryDecision::stop()
            } else {
                next.session_reset = true;
                RetryDecision::reset_session()
            }
        }

        FailureKind::RateLimited => {
            let suggested = failure
                .retry_after
                .or_else(|| options.throttle_backoff.next_delay(state.throttle_retries));
            match suggested {
                Some(delay)
                    if state.throttle_retries < options.throttle_retry_limit()
                        && state.throttle_wait + delay <= options.max_throttle_wait =>
                {
                    next.throttle_retries += 1;
                    next.throttle_wait += delay;
                    RetryDecision::retry_after(delay)
                }
                _ => RetryDecision::stop(),
            }
        }

        FailureKind::TransientNetwork => {
            match options.transient_backoff.delay_for(state.transient_retries) {
                Some(delay) => {
                    next.transient_retries += 1;
                    RetryDecision::retry_after(delay)
                }
                None => RetryDecision::stop(),
            }
        }
    };

    (decision, next)
}

/// Shared factory of per-operation retry policies.
#[derive(Debug)]
pub struct RetryPolicyEngine {
    options: Arc<RetryOptions>,
    session: Arc<SessionContainer>,
}

impl RetryPolicyEngine {
    /// Create an engine with the given options and session container.
    pub fn new(options: RetryOptions, session: Arc<SessionContainer>) -> Self {
        Self {
            options: Arc::new(options),
            session,
        }
    }

    /// Allocate a policy for one logical operation.
    ///
    /// Pure allocation: shared state is only read when the policy is later
    /// asked for the consistency context or applies a reset.
    pub fn request_policy(&self) -> RequestRetryPolicy {
        RequestRetryPolicy {
            options: Arc::clone(&self.options),
            session: Arc::clone(&self.session),
            state: RetryState::default(),
        }
    }

    /// Retry configuration.
    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Session container shared by all policies of this engine.
    pub fn session(&self) -> &Arc<SessionContainer> {
        &self.session
    }
}

/// Retry policy for one logical operation.
///
/// Never shared between operations: an `ensure exists` call uses one policy
/// for its probe, create and re-probe attempts.
#[derive(Debug)]
pub struct RequestRetryPolicy {
    options: Arc<RetryOptions>,
    session: Arc<SessionContainer>,
    state: RetryState,
}

impl RequestRetryPolicy {
    /// Judge a failed attempt and advance the per-operation state.
    pub fn should_retry(&mut self, failure: &Failure) -> RetryDecision {
        let (decision, next) = adjudicate(&self.options, self.state, failure);
        self.state = next;
        decision
    }

    /// Apply the side effect of `decision` to shared state.
    ///
    /// This is the only place a per-operation policy writes shared state.
    pub fn apply(&self, decision: &RetryDecision) {
        if decision.side_effect == SideEffect::ResetSessionToken {
            self.session.reset();
        }
    }

    /// Consistency context to attach to the next attempt.
    pub fn consistency(&self) -> Arc<ConsistencyContext> {
        self.session.snapshot()
    }

    /// Record the session token returned by a successful attempt.
    pub fn observe_session_token(&self, token: Option<&str>) {
        if let Some(token) = token {
            self.session.update_token(token);
        }
    }

    /// Current bookkeeping.
    pub fn state(&self) -> RetryState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::retry::ExponentialBackoff;

    fn options() -> RetryOptions {
        RetryOptions::default()
            .throttle_backoff(
                ExponentialBackoff::builder()
                    .max_retries(3)
                    .initial_delay(Duration::from_millis(100))
                    .jitter(0.0)
                    .build(),
            )
            .transient_backoff(
                ExponentialBackoff::builder()
                    .max_retries(2)
                    .initial_delay(Duration::from_millis(50))
                    .jitter(0.0)
                    .build(),
            )
    }

    fn engine() -> RetryPolicyEngine {
        RetryPolicyEngine::new(options(), Arc::new(SessionContainer::default()))
    }

    #[test]
    fn test_second_stale_session_is_terminal() {
        let mut policy = engine().request_policy();

        let first = policy.should_retry(&Failure::stale_session("lagging replica"));
        assert!(first.should_retry);
        assert_eq!(first.side_effect, SideEffect::ResetSessionToken);

        let second = policy.should_retry(&Failure::stale_session("lagging replica"));
        assert_eq!(second, RetryDecision::stop());
    }

    #[test]
    fn test_reset_is_per_policy_instance() {
        let engine = engine();
        let mut a = engine.request_policy();
        let mut b = engine.request_policy();

        assert!(a.should_retry(&Failure::stale_session("x")).should_retry);
        assert!(b.should_retry(&Failure::stale_session("x")).should_retry);
    }

    #[test]
    fn test_retry_after_is_used_verbatim() {
        let mut policy = engine().request_policy();
        let decision =
            policy.should_retry(&Failure::rate_limited(Some(Duration::from_millis(1234))));

        assert!(decision.should_retry);
        assert_eq!(decision.backoff, Duration::from_millis(1234));
        assert_eq!(policy.state().throttle_wait, Duration::from_millis(1234));
    }

    #[test]
    fn test_throttle_without_hint_grows_exponentially_and_caps() {
        let mut policy = engine().request_policy();
        let delays: Vec<_> = (0..4)
            .map(|_| policy.should_retry(&Failure::rate_limited(None)))
            .collect();

        assert_eq!(delays[0].backoff, Duration::from_millis(100));
        assert_eq!(delays[1].backoff, Duration::from_millis(200));
        assert_eq!(delays[2].backoff, Duration::from_millis(400));
        assert!(!delays[3].should_retry);
    }

    #[test]
    fn test_throttle_wait_budget() {
        let opts = options().max_throttle_wait(Duration::from_secs(1));
        let state = RetryState::default();

        let (decision, state) = adjudicate(
            &opts,
            state,
            &Failure::rate_limited(Some(Duration::from_millis(800))),
        );
        assert!(decision.should_retry);

        let (decision, _) = adjudicate(
            &opts,
            state,
            &Failure::rate_limited(Some(Duration::from_millis(800))),
        );
        assert!(!decision.should_retry);
    }

    #[test]
    fn test_transient_is_bounded() {
        let mut policy = engine().request_policy();

        let first = policy.should_retry(&Failure::transient("reset by peer"));
        let second = policy.should_retry(&Failure::transient("reset by peer"));
        let third = policy.should_retry(&Failure::transient("reset by peer"));

        assert_eq!(first.backoff, Duration::from_millis(50));
        assert_eq!(second.backoff, Duration::from_millis(100));
        assert!(!third.should_retry);
        assert_eq!(policy.state().attempts, 3);
    }

    #[test]
    fn test_business_and_fatal_failures_stop() {
        for failure in [
            Failure::not_found("x"),
            Failure::conflict("x"),
            Failure::fatal("unauthorized"),
        ] {
            let (decision, _) = adjudicate(&options(), RetryState::default(), &failure);
            assert_eq!(decision, RetryDecision::stop(), "{failure}");
        }
    }

    #[test]
    fn test_adjudicate_does_not_mutate_input_state() {
        let state = RetryState::default();
        let (_, next) = adjudicate(&options(), state, &Failure::stale_session("x"));

        assert!(!state.session_reset);
        assert!(next.session_reset);
        assert_eq!(next.attempts, 1);
    }

    #[test]
    fn test_apply_resets_shared_session() {
        let session = Arc::new(SessionContainer::new(ConsistencyContext::new(Some(
            "0:1#9".into(),
        ))));
        let engine = RetryPolicyEngine::new(options(), Arc::clone(&session));
        let mut policy = engine.request_policy();

        let decision = policy.should_retry(&Failure::stale_session("x"));
        policy.apply(&decision);

        assert_eq!(session.snapshot().session_token(), None);
        assert_eq!(policy.consistency().generation(), 1);
    }

    #[test]
    fn test_request_policy_is_side_effect_free() {
        let session = Arc::new(SessionContainer::new(ConsistencyContext::new(Some(
            "0:1#9".into(),
        ))));
        let engine = RetryPolicyEngine::new(options(), Arc::clone(&session));
        let before = session.snapshot();

        let _policy = engine.request_policy();

        assert!(Arc::ptr_eq(&before, &session.snapshot()));
    }
}
