//! svcgraph - Dependency-ordered service provisioning with transactional
//! configuration changes
//!
//! Services declare their dependencies by name; the [`LifecycleEngine`]
//! starts each one only after everything it needs is `UP`. Configuration
//! changes go through an [`OperationController`], which validates an
//! [`Intent`], stages the model change, installs the matching services, and
//! commits only once they verified. Failures roll back both layers.
//!
//! ```
//! # tokio_test::block_on(async {
//! use std::sync::Arc;
//! use svcgraph::config::ProvisioningConfig;
//! use svcgraph::model::ConfigModel;
//! use svcgraph::remoting::{self, DefaultConnectionBuilder, Endpoint, OutboundSocketBinding};
//! use svcgraph::{LifecycleEngine, OperationController};
//!
//! let engine = LifecycleEngine::new();
//! remoting::publish_endpoint(&engine, Endpoint::new("node1")).unwrap();
//! remoting::publish_socket_binding(
//!     &engine,
//!     OutboundSocketBinding::new("node2-binding", "10.0.0.2", 4447),
//! )
//! .unwrap();
//!
//! let controller = OperationController::new(
//!     Arc::new(ConfigModel::new()),
//!     engine,
//!     remoting::handlers(Arc::new(DefaultConnectionBuilder)),
//!     ProvisioningConfig::default(),
//! );
//! let intent = remoting::local_outbound_connection_add(
//!     "to-node2",
//!     "node2-binding",
//!     vec![(Some("RECONNECT_TASKS"), "3")],
//! )
//! .unwrap();
//!
//! let report = controller.execute(intent).await;
//! assert!(report.is_committed());
//! # })
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod remoting;
pub mod service;
pub mod transaction;
pub mod utils;

pub use config::Config;
pub use error::{ProvisionError, Result};
pub use model::{ConfigModel, Resource, ResourceAddress};
pub use service::{
    DependencyRegistry, LifecycleEngine, LifecycleState, Service, ServiceDescriptor, ServiceName,
    ServiceStatus, VerificationGate,
};
pub use transaction::{
    Intent, OperationController, OperationKind, TransactionReport, TransactionState,
};
