//! Testing utilities
//!
//! Provides an in-memory transport that behaves like the store closely
//! enough to exercise retries, provisioning races and session tracking
//! without a server.

use crate::address::ResourceAddress;
use crate::error::Failure;
use crate::transport::{OperationKind, Resource, ResourceRequest, ResourceTransport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One attempt seen by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAttempt {
    /// Operation attempted
    pub operation: OperationKind,
    /// Address the attempt targeted (parent for creates)
    pub address: ResourceAddress,
    /// Session token the attempt carried
    pub session_token: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    resources: HashMap<ResourceAddress, Resource>,
    failures: HashMap<OperationKind, VecDeque<Failure>>,
    scheduled: HashMap<(OperationKind, usize), Failure>,
    racing_writes: VecDeque<Value>,
    attempts: Vec<RecordedAttempt>,
    lsn: u64,
}

/// In-memory transport for tests.
///
/// Writes are atomic under one lock, so two concurrent creates of the same
/// identity always produce one success and one conflict.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<State>>,
    latency: Option<Duration>,
}

impl InMemoryTransport {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate network latency on every attempt.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next attempt of `operation` with `failure`.
    ///
    /// Failures queue up per operation and are consumed in order.
    pub async fn inject_failure(&self, operation: OperationKind, failure: Failure) {
        self.state
            .lock()
            .await
            .failures
            .entry(operation)
            .or_default()
            .push_back(failure);
    }

    /// Fail the `nth` attempt of `operation` (counting from 1) with `failure`.
    ///
    /// Takes precedence over failures queued with
    /// [`inject_failure`](Self::inject_failure).
    pub async fn fail_nth(&self, operation: OperationKind, nth: usize, failure: Failure) {
        self.state
            .lock()
            .await
            .scheduled
            .insert((operation, nth), failure);
    }

    /// Have another writer create `body` right before the next create
    /// attempt, under the parent that attempt targets.
    pub async fn race_next_create(&self, body: Value) {
        self.state.lock().await.racing_writes.push_back(body);
    }

    /// Seed a resource directly.
    pub async fn insert(&self, address: ResourceAddress, body: Value) {
        let mut state = self.state.lock().await;
        state.lsn += 1;
        let resource = Resource {
            etag: Some(format!("\"{}\"", state.lsn)),
            ..Resource::new(address.clone(), body)
        };
        state.resources.insert(address, resource);
    }

    /// Stored resource at `address`.
    pub async fn get(&self, address: &ResourceAddress) -> Option<Resource> {
        self.state.lock().await.resources.get(address).cloned()
    }

    /// Number of stored resources.
    pub async fn len(&self) -> usize {
        self.state.lock().await.resources.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every attempt seen so far.
    pub async fn attempts(&self) -> Vec<RecordedAttempt> {
        self.state.lock().await.attempts.clone()
    }

    /// Number of attempts of `operation` seen so far.
    pub async fn count(&self, operation: OperationKind) -> usize {
        self.state
            .lock()
            .await
            .attempts
            .iter()
            .filter(|a| a.operation == operation)
            .count()
    }
}

impl State {
    fn write(&mut self, address: ResourceAddress, body: Value) -> Resource {
        self.lsn += 1;
        let resource = Resource {
            address: address.clone(),
            body,
            etag: Some(format!("\"{}\"", self.lsn)),
            session_token: Some(format!("0:1#{}", self.lsn)),
        };
        self.resources.insert(address, resource.clone());
        resource
    }

    fn target_of(request: &ResourceRequest) -> Result<ResourceAddress, Failure> {
        let id = request
            .payload_id()
            .ok_or_else(|| Failure::from_status(400, None, "payload has no id", None))?;
        request
            .address
            .child(request.kind, id)
            .map_err(|e| Failure::from_status(400, None, e.to_string(), None))
    }

    fn parent_exists(&self, parent: &ResourceAddress) -> bool {
        parent.is_root() || self.resources.contains_key(parent)
    }

    fn apply(&mut self, request: &ResourceRequest) -> Result<Resource, Failure> {
        match request.operation {
            OperationKind::Read => self
                .resources
                .get(&request.address)
                .cloned()
                .ok_or_else(|| Failure::not_found(request.address.to_string())),

            OperationKind::Create => {
                if let Some(body) = self.racing_writes.pop_front() {
                    let mut racing = request.clone();
                    racing.payload = Some(body.clone());
                    let address = Self::target_of(&racing)?;
                    self.write(address, body);
                }

                if !self.parent_exists(&request.address) {
                    return Err(Failure::not_found(request.address.to_string()));
                }
                let address = Self::target_of(request)?;
                if self.resources.contains_key(&address) {
                    return Err(Failure::conflict(address.to_string()));
                }
                Ok(self.write(address, request.payload.clone().unwrap_or_default()))
            }

            OperationKind::Upsert => {
                if !self.parent_exists(&request.address) {
                    return Err(Failure::not_found(request.address.to_string()));
                }
                let address = Self::target_of(request)?;
                Ok(self.write(address, request.payload.clone().unwrap_or_default()))
            }

            OperationKind::Replace => {
                let current = self
                    .resources
                    .get(&request.address)
                    .ok_or_else(|| Failure::not_found(request.address.to_string()))?;
                if let Some(expected) = &request.options.if_match_etag
                    && current.etag.as_ref() != Some(expected)
                {
                    return Err(Failure::from_status(412, None, "etag mismatch", None));
                }
                Ok(self.write(
                    request.address.clone(),
                    request.payload.clone().unwrap_or_default(),
                ))
            }

            OperationKind::Delete => {
                let removed = self
                    .resources
                    .remove(&request.address)
                    .ok_or_else(|| Failure::not_found(request.address.to_string()))?;
                self.resources
                    .retain(|address, _| !is_descendant(address, &request.address));
                Ok(removed)
            }
        }
    }
}

fn is_descendant(candidate: &ResourceAddress, ancestor: &ResourceAddress) -> bool {
    let mut current = candidate.parent();
    while let Some(address) = current {
        if &address == ancestor {
            return true;
        }
        current = address.parent();
    }
    false
}

#[async_trait]
impl ResourceTransport for InMemoryTransport {
    async fn attempt(&self, request: ResourceRequest) -> Result<Resource, Failure> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        state.attempts.push(RecordedAttempt {
            operation: request.operation,
            address: request.address.clone(),
            session_token: request.effective_session_token().map(str::to_string),
        });

        let nth = state
            .attempts
            .iter()
            .filter(|a| a.operation == request.operation)
            .count();
        if let Some(failure) = state.scheduled.remove(&(request.operation, nth)) {
            return Err(failure);
        }
        if let Some(failure) = state
            .failures
            .get_mut(&request.operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(failure);
        }

        state.apply(&request)
    }
}
