//! Retry-scoped execution of attempts.
//!
//! An [`OperationScope`] is one logical operation: it owns the operation's
//! [`RequestRetryPolicy`], its activity id and the caller's cancellation
//! token. Each call to [`OperationScope::run`] performs one *step* (a read, a
//! create, ...) and retries that step's transient failures under the shared
//! policy, so limits such as the single session reset span every step of the
//! operation.

use crate::error::{Error, Failure, Result};
use crate::observability::{AttemptMetadata, AttemptTimer};
use crate::policy::{RequestRetryPolicy, RetryPolicyEngine};
use crate::session::ConsistencyContext;
use crate::transport::{Resource, ResourceRequest, ResourceTransport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One logical operation in flight.
#[derive(Debug)]
pub struct OperationScope {
    policy: RequestRetryPolicy,
    cancel: CancellationToken,
    activity_id: Uuid,
    attempts: u32,
}

impl OperationScope {
    /// Start an operation with a fresh policy from `engine`.
    pub fn new(engine: &RetryPolicyEngine, cancel: CancellationToken) -> Self {
        Self {
            policy: engine.request_policy(),
            cancel,
            activity_id: Uuid::new_v4(),
            attempts: 0,
        }
    }

    /// Activity id shared by every attempt of this operation.
    pub fn activity_id(&self) -> Uuid {
        self.activity_id
    }

    /// Attempts issued so far, across all steps.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the caller asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The retry policy of this operation.
    pub fn policy(&self) -> &RequestRetryPolicy {
        &self.policy
    }

    /// Run one step until it succeeds or fails terminally.
    ///
    /// `build` is called once per attempt with the consistency context that
    /// attempt should carry. `NotFound` and `Conflict` come back as
    /// [`Error::Failed`] immediately, for the caller to act on. Cancellation
    /// is checked before every attempt and interrupts backoff sleeps; an
    /// attempt already handed to the transport runs to completion.
    pub async fn run<F>(&mut self, transport: &dyn ResourceTransport, build: F) -> Result<Resource>
    where
        F: Fn(Arc<ConsistencyContext>) -> ResourceRequest,
    {
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.attempts += 1;
            let request = build(self.policy.consistency());
            let meta = AttemptMetadata::new(
                self.activity_id,
                request.operation,
                &request.address,
                self.attempts,
            );
            meta.log_attempt();

            let timer = AttemptTimer::start();
            let failure: Failure = match transport.attempt(request).await {
                Ok(resource) => {
                    self.policy
                        .observe_session_token(resource.session_token.as_deref());
                    meta.log_success(timer.elapsed());
                    return Ok(resource);
                }
                Err(failure) => failure,
            };

            let decision = self.policy.should_retry(&failure);
            if !decision.should_retry {
                if failure.kind.is_business_outcome() {
                    tracing::debug!(
                        activity_id = %self.activity_id,
                        kind = %failure.kind,
                        "Attempt returned business outcome"
                    );
                } else {
                    meta.log_failure(&failure, timer.elapsed());
                }
                return Err(Error::Failed(failure));
            }

            meta.log_retry(&failure, &decision);
            self.policy.apply(&decision);

            if decision.backoff.is_zero() {
                continue;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(decision.backoff) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{ResourceAddress, ResourceKind};
    use crate::config::RetryOptions;
    use crate::options::RequestOptions;
    use crate::session::SessionContainer;
    use crate::transport::OperationKind;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a fixed script of outcomes and records what it was sent.
    struct Scripted {
        outcomes: Mutex<VecDeque<std::result::Result<Resource, Failure>>>,
        seen_tokens: Mutex<Vec<Option<String>>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<std::result::Result<Resource, Failure>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                seen_tokens: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ResourceTransport for Scripted {
        async fn attempt(
            &self,
            request: ResourceRequest,
        ) -> std::result::Result<Resource, Failure> {
            self.seen_tokens
                .lock()
                .unwrap()
                .push(request.effective_session_token().map(str::to_string));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Failure::fatal("script exhausted")))
        }
    }

    fn db() -> ResourceAddress {
        ResourceAddress::database("db").unwrap()
    }

    fn read(consistency: Arc<ConsistencyContext>) -> ResourceRequest {
        ResourceRequest {
            operation: OperationKind::Read,
            kind: ResourceKind::Database,
            address: db(),
            payload: None,
            options: RequestOptions::default(),
            consistency,
        }
    }

    fn found() -> Resource {
        Resource {
            session_token: Some("0:1#2".into()),
            ..Resource::new(db(), json!({ "id": "db" }))
        }
    }

    fn engine(session: Arc<SessionContainer>) -> RetryPolicyEngine {
        RetryPolicyEngine::new(RetryOptions::default(), session)
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let transport = Scripted::new(vec![
            Err(Failure::transient("timeout")),
            Err(Failure::rate_limited(Some(Duration::from_millis(10)))),
            Ok(found()),
        ]);
        let engine = engine(Arc::default());
        let mut scope = OperationScope::new(&engine, CancellationToken::new());

        let resource = scope.run(&transport, read).await.unwrap();

        assert_eq!(resource.id(), Some("db"));
        assert_eq!(scope.attempts(), 3);
        assert_eq!(engine.session().snapshot().session_token(), Some("0:1#2"));
    }

    #[tokio::test]
    async fn test_stale_session_resets_token_for_next_attempt() {
        let session = Arc::new(SessionContainer::new(ConsistencyContext::new(Some(
            "0:1#99".into(),
        ))));
        let transport = Scripted::new(vec![Err(Failure::stale_session("behind")), Ok(found())]);
        let engine = engine(Arc::clone(&session));
        let mut scope = OperationScope::new(&engine, CancellationToken::new());

        scope.run(&transport, read).await.unwrap();

        let seen = transport.seen_tokens.lock().unwrap().clone();
        assert_eq!(seen, vec![Some("0:1#99".to_string()), None]);
    }

    #[tokio::test]
    async fn test_not_found_is_returned_untouched() {
        let transport = Scripted::new(vec![Err(Failure::not_found("dbs/db"))]);
        let engine = engine(Arc::default());
        let mut scope = OperationScope::new(&engine, CancellationToken::new());

        let err = scope.run(&transport, read).await.unwrap_err();

        assert_eq!(err.failure(), Some(&Failure::not_found("dbs/db")));
        assert_eq!(scope.attempts(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_scope_issues_no_attempt() {
        let transport = Scripted::new(vec![Ok(found())]);
        let engine = engine(Arc::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut scope = OperationScope::new(&engine, cancel);

        let err = scope.run(&transport, read).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(transport.seen_tokens.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let transport = Scripted::new(vec![
            Err(Failure::rate_limited(Some(Duration::from_secs(20)))),
            Ok(found()),
        ]);
        let engine = engine(Arc::default());
        let cancel = CancellationToken::new();
        let mut scope = OperationScope::new(&engine, cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let err = scope.run(&transport, read).await.unwrap_err();
        canceller.await.unwrap();

        assert!(err.is_cancelled());
        assert_eq!(scope.attempts(), 1);
    }
}
