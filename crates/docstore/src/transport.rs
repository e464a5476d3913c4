//! Transport contract consumed by the client
//!
//! The client never talks to the network itself. Every attempt goes through a
//! [`ResourceTransport`], which performs exactly one request and reports the
//! outcome as a [`Resource`] or a structured [`Failure`].

use crate::address::{ResourceAddress, ResourceKind};
use crate::error::Failure;
use crate::options::RequestOptions;
use crate::session::ConsistencyContext;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Operation performed by one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Read a resource by address
    Read,
    /// Create a resource under a parent
    Create,
    /// Replace an existing resource
    Replace,
    /// Create or replace
    Upsert,
    /// Delete a resource
    Delete,
}

impl OperationKind {
    /// Short lowercase name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Replace => "replace",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Address of the resource
    pub address: ResourceAddress,
    /// Resource body
    pub body: Value,
    /// Version tag for optimistic concurrency
    pub etag: Option<String>,
    /// Session token returned with the response
    pub session_token: Option<String>,
}

impl Resource {
    /// Create a resource without version or session metadata.
    pub fn new(address: ResourceAddress, body: Value) -> Self {
        Self {
            address,
            body,
            etag: None,
            session_token: None,
        }
    }

    /// Identity of the resource.
    pub fn id(&self) -> Option<&str> {
        self.address.id()
    }

    /// Deserialize the body into a typed value.
    pub fn body_as<T: serde::de::DeserializeOwned>(&self) -> crate::error::Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// One request handed to the transport.
///
/// For `Create` and `Upsert` the address is the *parent* and `kind` names
/// the kind being created. For every other operation the address is the
/// target itself.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    /// Operation to perform
    pub operation: OperationKind,
    /// Kind of the target resource
    pub kind: ResourceKind,
    /// Target, or parent for creates
    pub address: ResourceAddress,
    /// Body for create/replace/upsert
    pub payload: Option<Value>,
    /// Options passed through unmodified
    pub options: RequestOptions,
    /// Session state at the time the attempt was issued
    pub consistency: Arc<ConsistencyContext>,
}

impl ResourceRequest {
    /// Session token the transport should send: an explicit option wins over
    /// the cached context.
    pub fn effective_session_token(&self) -> Option<&str> {
        self.options
            .session_token
            .as_deref()
            .or_else(|| self.consistency.session_token())
    }

    /// Identity of the created body, for create and upsert requests.
    pub fn payload_id(&self) -> Option<&str> {
        self.payload.as_ref()?.get("id")?.as_str()
    }
}

/// Capability to perform a single attempt against the store.
#[async_trait]
pub trait ResourceTransport: Send + Sync {
    /// Perform one attempt. Implementations must not retry internally.
    async fn attempt(&self, request: ResourceRequest) -> Result<Resource, Failure>;
}

#[async_trait]
impl<T: ResourceTransport + ?Sized> ResourceTransport for Arc<T> {
    async fn attempt(&self, request: ResourceRequest) -> Result<Resource, Failure> {
        (**self).attempt(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(options: RequestOptions, cached: Option<&str>) -> ResourceRequest {
        ResourceRequest {
            operation: OperationKind::Read,
            kind: ResourceKind::Database,
            address: ResourceAddress::database("db").unwrap(),
            payload: Some(json!({ "id": "db" })),
            options,
            consistency: Arc::new(ConsistencyContext::new(cached.map(str::to_string))),
        }
    }

    #[test]
    fn test_explicit_session_token_wins() {
        let req = request(RequestOptions::new().session_token("explicit"), Some("cached"));
        assert_eq!(req.effective_session_token(), Some("explicit"));

        let req = request(RequestOptions::new(), Some("cached"));
        assert_eq!(req.effective_session_token(), Some("cached"));
    }

    #[test]
    fn test_payload_id() {
        assert_eq!(request(RequestOptions::new(), None).payload_id(), Some("db"));
    }

    #[test]
    fn test_body_as_typed() {
        #[derive(serde::Deserialize)]
        struct Db {
            id: String,
        }

        let resource = Resource::new(
            ResourceAddress::database("db").unwrap(),
            json!({ "id": "db" }),
        );
        let db: Db = resource.body_as().unwrap();
        assert_eq!(db.id, "db");
        assert_eq!(resource.id(), Some("db"));
    }
}
