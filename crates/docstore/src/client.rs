//! Main client implementation

use std::sync::Arc;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::{
    address::{ResourceAddress, ResourceKind},
    config::{ClientConfig, RetryOptions},
    error::{Error, Failure, Result},
    executor::OperationScope,
    options::RequestOptions,
    policy::RetryPolicyEngine,
    provision::{ProvisionRequest, ProvisioningOutcome, Provisioner},
    session::{ConsistencyContext, SessionContainer},
    transport::{OperationKind, Resource, ResourceRequest, ResourceTransport},
};

/// Client for a partitioned document store.
///
/// Every operation runs under its own retry policy from the client's
/// [`RetryPolicyEngine`]; the engine's session container is shared by all of
/// them. Cloning the client is cheap and shares that state.
///
/// # Example
///
/// ```rust,no_run
/// use docstore::testing::InMemoryTransport;
/// use docstore::DocumentClient;
///
/// # async fn example() -> docstore::Result<()> {
/// let client = DocumentClient::new(InMemoryTransport::new());
///
/// let db = client.create_database_if_not_exists("inventory").await;
/// let coll = client
///     .create_collection_if_not_exists("inventory", "orders", Some(400))
///     .await;
/// assert!(db.is_success() && coll.is_success());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DocumentClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn ResourceTransport>,
    engine: Arc<RetryPolicyEngine>,
    provisioner: Provisioner,
    default_options: RequestOptions,
}

impl std::fmt::Debug for DocumentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentClient")
            .field("engine", &self.inner.engine)
            .field("default_options", &self.inner.default_options)
            .finish_non_exhaustive()
    }
}

impl DocumentClient {
    /// Create a client with default configuration.
    pub fn new(transport: impl ResourceTransport + 'static) -> Self {
        Self::from_config(ClientConfig::default(), Arc::new(transport))
    }

    /// Create a new client builder for advanced configuration.
    pub fn builder() -> DocumentClientBuilder {
        DocumentClientBuilder::default()
    }

    /// Create a client from a configuration object.
    pub fn from_config(config: ClientConfig, transport: Arc<dyn ResourceTransport>) -> Self {
        let session = Arc::new(SessionContainer::new(ConsistencyContext::new(
            config.initial_session_token,
        )));
        Self::with_session(config.retry, config.default_options, session, transport)
    }

    fn with_session(
        retry: RetryOptions,
        default_options: RequestOptions,
        session: Arc<SessionContainer>,
        transport: Arc<dyn ResourceTransport>,
    ) -> Self {
        let engine = Arc::new(RetryPolicyEngine::new(retry, session));
        let provisioner = Provisioner::new(Arc::clone(&transport), Arc::clone(&engine));
        Self {
            inner: Arc::new(ClientInner {
                transport,
                engine,
                provisioner,
                default_options,
            }),
        }
    }

    /// The retry policy engine shared by this client's operations.
    pub fn engine(&self) -> &RetryPolicyEngine {
        &self.inner.engine
    }

    /// Current session consistency context.
    pub fn consistency(&self) -> Arc<ConsistencyContext> {
        self.inner.engine.session().snapshot()
    }

    /// The provisioning orchestrator backing the `*_if_not_exists` calls.
    pub fn provisioner(&self) -> &Provisioner {
        &self.inner.provisioner
    }

    fn options(&self, options: Option<RequestOptions>) -> RequestOptions {
        options
            .unwrap_or_default()
            .merged_over(&self.inner.default_options)
    }

    async fn execute(
        &self,
        operation: OperationKind,
        kind: ResourceKind,
        address: ResourceAddress,
        payload: Option<Value>,
        options: Option<RequestOptions>,
    ) -> Result<Resource> {
        let options = self.options(options);
        let mut scope = OperationScope::new(&self.inner.engine, CancellationToken::new());
        scope
            .run(self.inner.transport.as_ref(), |consistency| ResourceRequest {
                operation,
                kind,
                address: address.clone(),
                payload: payload.clone(),
                options: options.clone(),
                consistency,
            })
            .await
    }

    fn kind_of(address: &ResourceAddress) -> Result<ResourceKind> {
        address
            .kind()
            .ok_or_else(|| Error::InvalidAddress("the account root is not a resource".into()))
    }

    /// Read a resource, retrying transient failures.
    pub async fn read(
        &self,
        address: &ResourceAddress,
        options: Option<RequestOptions>,
    ) -> Result<Resource> {
        let kind = Self::kind_of(address)?;
        self.execute(OperationKind::Read, kind, address.clone(), None, options)
            .await
    }

    /// Create a resource of `kind` under `parent`; `body` must carry an `id`.
    ///
    /// A conflict is returned as an error, use
    /// [`ensure_exists`](Self::ensure_exists) for create-or-get semantics.
    pub async fn create(
        &self,
        parent: &ResourceAddress,
        kind: ResourceKind,
        body: Value,
        options: Option<RequestOptions>,
    ) -> Result<Resource> {
        Self::require_id(parent, kind, &body)?;
        self.execute(OperationKind::Create, kind, parent.clone(), Some(body), options)
            .await
    }

    /// Replace a resource, retrying transient failures.
    pub async fn replace(
        &self,
        address: &ResourceAddress,
        body: Value,
        options: Option<RequestOptions>,
    ) -> Result<Resource> {
        let kind = Self::kind_of(address)?;
        self.execute(
            OperationKind::Replace,
            kind,
            address.clone(),
            Some(body),
            options,
        )
        .await
    }

    /// Create or replace a resource of `kind` under `parent`.
    pub async fn upsert(
        &self,
        parent: &ResourceAddress,
        kind: ResourceKind,
        body: Value,
        options: Option<RequestOptions>,
    ) -> Result<Resource> {
        Self::require_id(parent, kind, &body)?;
        self.execute(OperationKind::Upsert, kind, parent.clone(), Some(body), options)
            .await
    }

    /// Delete a resource, retrying transient failures.
    pub async fn delete(
        &self,
        address: &ResourceAddress,
        options: Option<RequestOptions>,
    ) -> Result<Resource> {
        let kind = Self::kind_of(address)?;
        self.execute(OperationKind::Delete, kind, address.clone(), None, options)
            .await
    }

    fn require_id(parent: &ResourceAddress, kind: ResourceKind, body: &Value) -> Result<()> {
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidAddress(format!("{kind} body has no string id")))?;
        parent.child(kind, id).map(|_| ())
    }

    /// Make sure a resource exists, creating it if needed.
    ///
    /// The request's options are merged over the client defaults. The
    /// operation stops issuing attempts once `cancel` fires.
    pub async fn ensure_exists(
        &self,
        mut request: ProvisionRequest,
        cancel: CancellationToken,
    ) -> ProvisioningOutcome {
        request.options = self.options(Some(request.options));
        self.inner.provisioner.ensure_exists(request, cancel).await
    }

    async fn ensure(&self, request: ProvisionRequest) -> ProvisioningOutcome {
        self.ensure_exists(request, CancellationToken::new()).await
    }

    fn provision_under(
        parent: Result<ResourceAddress>,
        kind: ResourceKind,
        id: &str,
        body: Value,
    ) -> std::result::Result<ProvisionRequest, ProvisioningOutcome> {
        parent
            .map(|parent| ProvisionRequest::new(parent, kind, id, body))
            .map_err(|e| ProvisioningOutcome::Failed(Failure::fatal(e.to_string())))
    }

    /// Create a database unless it already exists.
    pub async fn create_database_if_not_exists(&self, id: &str) -> ProvisioningOutcome {
        let request = ProvisionRequest::new(
            ResourceAddress::root(),
            ResourceKind::Database,
            id,
            json!({ "id": id }),
        );
        self.ensure(request).await
    }

    /// Create a collection unless it already exists.
    ///
    /// `throughput` is only used when this call creates the collection.
    pub async fn create_collection_if_not_exists(
        &self,
        database: &str,
        id: &str,
        throughput: Option<u32>,
    ) -> ProvisioningOutcome {
        self.create_collection_with_definition_if_not_exists(
            database,
            json!({ "id": id }),
            throughput,
        )
        .await
    }

    /// Create a collection from a full definition (indexing policy,
    /// partition key, ...) unless one with the same id already exists.
    pub async fn create_collection_with_definition_if_not_exists(
        &self,
        database: &str,
        definition: Value,
        throughput: Option<u32>,
    ) -> ProvisioningOutcome {
        let Some(id) = definition.get("id").and_then(Value::as_str).map(str::to_string) else {
            return ProvisioningOutcome::Failed(Failure::fatal(
                "collection definition has no string id",
            ));
        };
        let request = match Self::provision_under(
            ResourceAddress::database(database),
            ResourceKind::Collection,
            &id,
            definition,
        ) {
            Ok(request) => request,
            Err(outcome) => return outcome,
        };

        let options = RequestOptions {
            offer_throughput: throughput,
            ..Default::default()
        };
        self.ensure(request.with_options(options)).await
    }

    /// Create a stored procedure unless it already exists.
    pub async fn create_stored_procedure_if_not_exists(
        &self,
        database: &str,
        collection: &str,
        id: &str,
        body: &str,
    ) -> ProvisioningOutcome {
        self.create_script_if_not_exists(
            database,
            collection,
            ResourceKind::StoredProcedure,
            json!({ "id": id, "body": body }),
        )
        .await
    }

    /// Create a trigger unless it already exists.
    ///
    /// `trigger_type` is `"Pre"` or `"Post"`, `operation` is the operation
    /// the trigger fires on (`"All"`, `"Create"`, ...).
    pub async fn create_trigger_if_not_exists(
        &self,
        database: &str,
        collection: &str,
        id: &str,
        body: &str,
        trigger_type: &str,
        operation: &str,
    ) -> ProvisioningOutcome {
        self.create_script_if_not_exists(
            database,
            collection,
            ResourceKind::Trigger,
            json!({
                "id": id,
                "body": body,
                "triggerType": trigger_type,
                "triggerOperation": operation,
            }),
        )
        .await
    }

    /// Create a user defined function unless it already exists.
    pub async fn create_user_defined_function_if_not_exists(
        &self,
        database: &str,
        collection: &str,
        id: &str,
        body: &str,
    ) -> ProvisioningOutcome {
        self.create_script_if_not_exists(
            database,
            collection,
            ResourceKind::UserDefinedFunction,
            json!({ "id": id, "body": body }),
        )
        .await
    }

    async fn create_script_if_not_exists(
        &self,
        database: &str,
        collection: &str,
        kind: ResourceKind,
        body: Value,
    ) -> ProvisioningOutcome {
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match Self::provision_under(
            ResourceAddress::collection(database, collection),
            kind,
            &id,
            body,
        ) {
            Ok(request) => self.ensure(request).await,
            Err(outcome) => outcome,
        }
    }
}

/// Builder for [`DocumentClient`].
#[derive(Default)]
pub struct DocumentClientBuilder {
    config: ClientConfig,
    session: Option<Arc<SessionContainer>>,
    transport: Option<Arc<dyn ResourceTransport>>,
}

impl DocumentClientBuilder {
    /// Set the transport.
    pub fn transport(mut self, transport: impl ResourceTransport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Set an already shared transport.
    pub fn shared_transport(mut self, transport: Arc<dyn ResourceTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Start from a configuration object.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set retry options.
    pub fn retry_options(mut self, retry: RetryOptions) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set options applied to every request.
    pub fn default_options(mut self, options: RequestOptions) -> Self {
        self.config.default_options = options;
        self
    }

    /// Set the session token to start from.
    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.config.initial_session_token = Some(token.into());
        self
    }

    /// Share a session container with other clients.
    ///
    /// Overrides [`session_token`](Self::session_token).
    pub fn session_container(mut self, session: Arc<SessionContainer>) -> Self {
        self.session = Some(session);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfig`] when no transport was set.
    pub fn build(self) -> Result<DocumentClient> {
        let transport = self
            .transport
            .ok_or_else(|| Error::MissingConfig("transport".to_string()))?;
        let session = self.session.unwrap_or_else(|| {
            Arc::new(SessionContainer::new(ConsistencyContext::new(
                self.config.initial_session_token.clone(),
            )))
        });
        Ok(DocumentClient::with_session(
            self.config.retry,
            self.config.default_options,
            session,
            transport,
        ))
    }
}
