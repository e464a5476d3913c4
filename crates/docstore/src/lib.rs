//! # docstore
//!
//! Client core for partitioned, eventually consistent document stores:
//! - Retry-scoped request execution with one policy per logical operation
//! - Session token tracking with a single reset per operation on stale reads
//! - Throttle handling that honours the server's retry-after
//! - Idempotent "create if not exists" provisioning that resolves races
//!   between concurrent callers
//!
//! The network layer is not part of this crate. Plug one in by implementing
//! [`ResourceTransport`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docstore::{DocumentClient, ProvisioningOutcome};
//! use docstore::testing::InMemoryTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = DocumentClient::new(InMemoryTransport::new());
//!
//!     match client.create_database_if_not_exists("inventory").await {
//!         ProvisioningOutcome::Created(db) => println!("created {}", db.address),
//!         ProvisioningOutcome::AlreadyExisted(db) => println!("found {}", db.address),
//!         ProvisioningOutcome::Failed(failure) => return Err(failure.into()),
//!         ProvisioningOutcome::Cancelled => unreachable!("never cancelled"),
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Re-export commonly used types
pub use address::{ResourceAddress, ResourceKind};
pub use client::{DocumentClient, DocumentClientBuilder};
pub use config::{ClientConfig, RetryOptions};
pub use error::{Error, Failure, FailureKind, Result};
pub use executor::OperationScope;
pub use options::{ConsistencyLevel, RequestOptions};
pub use policy::{RequestRetryPolicy, RetryDecision, RetryPolicyEngine, RetryState, SideEffect};
pub use provision::{ProvisionRequest, ProvisioningOutcome, Provisioner};
pub use session::{ConsistencyContext, SessionContainer};
pub use transport::{OperationKind, Resource, ResourceRequest, ResourceTransport};

// Module declarations
pub mod address;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod observability;
pub mod options;
pub mod policy;
pub mod provision;
pub mod session;
pub mod testing;
pub mod transport;

// Re-export key dependencies for convenience
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
