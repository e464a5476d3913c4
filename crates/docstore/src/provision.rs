//! Idempotent provisioning ("ensure this resource exists").
//!
//! [`Provisioner::ensure_exists`] runs a read → create → re-read sequence
//! under a single [`OperationScope`]:
//!
//! ```text
//! Probing   -> Found: AlreadyExisted | NotFound: Creating  | other: Failed
//! Creating  -> Ok: Created           | Conflict: ReProbing | other: Failed
//! ReProbing -> Found: AlreadyExisted | anything else: Failed
//! ```
//!
//! Transient failures inside each step are retried by the scope's policy
//! before the state machine sees them. A conflict on create means another
//! caller won the race, so the resource is read back instead of created
//! again. A re-probe that still finds nothing is reported as is: a conflict
//! followed by absence cannot be explained by a benign race.

use crate::address::{ResourceAddress, ResourceKind};
use crate::error::{Error, Failure, FailureKind, Result};
use crate::executor::OperationScope;
use crate::options::RequestOptions;
use crate::policy::RetryPolicyEngine;
use crate::transport::{OperationKind, Resource, ResourceRequest, ResourceTransport};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Result of an `ensure exists` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisioningOutcome {
    /// This call created the resource (201).
    Created(Resource),
    /// The resource was already there, or a racing caller created it (200).
    AlreadyExisted(Resource),
    /// A terminal failure, carried untouched.
    Failed(Failure),
    /// The caller cancelled before the operation finished.
    Cancelled,
}

impl ProvisioningOutcome {
    /// `Created` or `AlreadyExisted`.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Created(_) | Self::AlreadyExisted(_))
    }

    /// Whether this call created the resource.
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// The provisioned resource, for success outcomes.
    pub fn resource(&self) -> Option<&Resource> {
        match self {
            Self::Created(resource) | Self::AlreadyExisted(resource) => Some(resource),
            _ => None,
        }
    }

    /// The terminal failure, for `Failed`.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Status code equivalent: 201 for created, 200 for already existing.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Created(_) => Some(201),
            Self::AlreadyExisted(_) => Some(200),
            Self::Failed(failure) => failure.status,
            Self::Cancelled => None,
        }
    }

    /// Convert into a `Result` of the resource and whether it was created.
    pub fn into_result(self) -> Result<(Resource, bool)> {
        match self {
            Self::Created(resource) => Ok((resource, true)),
            Self::AlreadyExisted(resource) => Ok((resource, false)),
            Self::Failed(failure) => Err(Error::Failed(failure)),
            Self::Cancelled => Err(Error::Cancelled),
        }
    }
}

/// What to provision.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Owner of the resource (the root for databases)
    pub parent: ResourceAddress,
    /// Kind of resource
    pub kind: ResourceKind,
    /// Caller supplied identity
    pub id: String,
    /// Resource definition sent on create
    pub body: Value,
    /// Options passed through on every attempt
    pub options: RequestOptions,
}

impl ProvisionRequest {
    /// Provision `kind` with identity `id` under `parent`.
    ///
    /// If `body` is an object without an `id` field, `id` is inserted. A
    /// body whose `id` differs is rejected by [`target`](Self::target).
    pub fn new(
        parent: ResourceAddress,
        kind: ResourceKind,
        id: impl Into<String>,
        mut body: Value,
    ) -> Self {
        let id = id.into();
        if let Value::Object(map) = &mut body {
            map.entry("id").or_insert_with(|| Value::String(id.clone()));
        }
        Self {
            parent,
            kind,
            id,
            body,
            options: RequestOptions::default(),
        }
    }

    /// Set request options.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Address this request provisions.
    ///
    /// The body must be an object whose `id` equals [`id`](Self::id), so the
    /// resource created is the one probed.
    pub fn target(&self) -> std::result::Result<ResourceAddress, Failure> {
        let target = self
            .parent
            .child(self.kind, &self.id)
            .map_err(|e| Failure::fatal(e.to_string()))?;

        match self.body.as_object().map(|body| body.get("id")) {
            None => Err(Failure::fatal(format!(
                "{} body must be a JSON object",
                self.kind
            ))),
            Some(Some(Value::String(id))) if *id == self.id => Ok(target),
            Some(Some(other)) => Err(Failure::fatal(format!(
                "body id {other} does not match {target}"
            ))),
            Some(None) => Err(Failure::fatal(format!("{} body has no id", self.kind))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Probing,
    Creating,
    ReProbing,
}

/// Orchestrates idempotent provisioning over a transport.
#[derive(Clone)]
pub struct Provisioner {
    transport: Arc<dyn ResourceTransport>,
    engine: Arc<RetryPolicyEngine>,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    /// Create a provisioner.
    pub fn new(transport: Arc<dyn ResourceTransport>, engine: Arc<RetryPolicyEngine>) -> Self {
        Self { transport, engine }
    }

    /// Make sure the requested resource exists.
    ///
    /// Identity, address and body are validated before any attempt; an
    /// invalid identity yields `Failed` with a fatal failure.
    pub async fn ensure_exists(
        &self,
        request: ProvisionRequest,
        cancel: CancellationToken,
    ) -> ProvisioningOutcome {
        let target = match request.target() {
            Ok(target) => target,
            Err(failure) => return ProvisioningOutcome::Failed(failure),
        };

        let scope = OperationScope::new(&self.engine, cancel);
        let span = tracing::debug_span!(
            "ensure_exists",
            activity_id = %scope.activity_id(),
            address = %target,
        );
        self.drive(scope, &request, &target).instrument(span).await
    }

    async fn drive(
        &self,
        mut scope: OperationScope,
        request: &ProvisionRequest,
        target: &ResourceAddress,
    ) -> ProvisioningOutcome {
        let mut step = Step::Probing;
        loop {
            let result = match step {
                Step::Probing | Step::ReProbing => self.read(&mut scope, request, target).await,
                Step::Creating => self.create(&mut scope, request).await,
            };

            step = match (step, result) {
                (_, Err(Error::Cancelled)) => return ProvisioningOutcome::Cancelled,

                (Step::Probing | Step::ReProbing, Ok(resource)) => {
                    return ProvisioningOutcome::AlreadyExisted(resource);
                }
                (Step::Creating, Ok(resource)) => return ProvisioningOutcome::Created(resource),

                (Step::Probing, Err(Error::Failed(f))) if f.kind == FailureKind::NotFound => {
                    Step::Creating
                }
                (Step::Creating, Err(Error::Failed(f))) if f.kind == FailureKind::Conflict => {
                    tracing::debug!("Create conflicted, reading back the winner");
                    Step::ReProbing
                }

                (Step::ReProbing, Err(Error::Failed(f))) if f.kind == FailureKind::NotFound => {
                    tracing::warn!(address = %target, "Resource missing after create conflict");
                    return ProvisioningOutcome::Failed(f);
                }
                (_, Err(Error::Failed(f))) => return ProvisioningOutcome::Failed(f),
                (_, Err(other)) => {
                    return ProvisioningOutcome::Failed(Failure::fatal(other.to_string()));
                }
            };
        }
    }

    async fn read(
        &self,
        scope: &mut OperationScope,
        request: &ProvisionRequest,
        target: &ResourceAddress,
    ) -> Result<Resource> {
        scope
            .run(self.transport.as_ref(), |consistency| ResourceRequest {
                operation: OperationKind::Read,
                kind: request.kind,
                address: target.clone(),
                payload: None,
                options: request.options.clone(),
                consistency,
            })
            .await
    }

    async fn create(
        &self,
        scope: &mut OperationScope,
        request: &ProvisionRequest,
    ) -> Result<Resource> {
        scope
            .run(self.transport.as_ref(), |consistency| ResourceRequest {
                operation: OperationKind::Create,
                kind: request.kind,
                address: request.parent.clone(),
                payload: Some(request.body.clone()),
                options: request.options.clone(),
                consistency,
            })
            .await
    }
}
