//! Remoting subsystem: outbound connection resources and the services that
//! back them.
//!
//! An outbound connection installs one service under
//! `remoting.outbound-connection.<name>` with a type-qualified alias
//! (`remoting.local-outbound-connection.<name>` or
//! `remoting.remote-outbound-connection.<name>`). It depends on the remoting
//! endpoint and on the outbound socket binding it references; both are
//! published by their owning subsystems with [`publish_endpoint`] and
//! [`publish_socket_binding`].

pub mod connection;
pub mod handlers;
pub mod options;

pub use connection::{
    ConnectionBuilder, ConnectionKind, ConnectionSpec, DefaultConnectionBuilder, Endpoint,
    OutboundConnection, OutboundSocketBinding,
};
pub use handlers::OutboundConnectionHandler;
pub use options::ConnectionOptions;

use std::sync::Arc;

use crate::error::{ProvisionError, Result};
use crate::model::ResourceAddress;
use crate::service::name::{
    LOCAL_OUTBOUND_CONNECTION_BASE, OUTBOUND_CONNECTION_BASE, OUTBOUND_SOCKET_BINDING_BASE,
    REMOTE_OUTBOUND_CONNECTION_BASE, SUBSYSTEM_ENDPOINT,
};
use crate::service::{LifecycleEngine, ServiceName};
use crate::transaction::{HandlerRegistry, Intent};

// Resource types
pub const LOCAL_OUTBOUND_CONNECTION: &str = "local-outbound-connection";
pub const REMOTE_OUTBOUND_CONNECTION: &str = "remote-outbound-connection";

// Attributes
pub const NAME: &str = "name";
pub const SOCKET_BINDING_REF: &str = "socket-binding-reference";
pub const CONNECTION_CREATION_OPTIONS: &str = "connection-creation-options";
pub const USERNAME: &str = "username";
pub const PROTOCOL: &str = "protocol";

/// Generic service name of connection `name`.
pub fn connection_service(name: &str) -> ServiceName {
    OUTBOUND_CONNECTION_BASE.append(name)
}

/// Type-qualified alias of connection `name`.
pub fn alias_service(kind: ConnectionKind, name: &str) -> ServiceName {
    match kind {
        ConnectionKind::Local => LOCAL_OUTBOUND_CONNECTION_BASE.append(name),
        ConnectionKind::Remote => REMOTE_OUTBOUND_CONNECTION_BASE.append(name),
    }
}

/// Service name of the outbound socket binding `binding_ref`.
pub fn socket_binding_service(binding_ref: &str) -> ServiceName {
    OUTBOUND_SOCKET_BINDING_BASE.append(binding_ref)
}

/// Address of a local outbound connection.
pub fn local_connection_address(name: &str) -> ResourceAddress {
    ResourceAddress::remoting_subsystem().append(LOCAL_OUTBOUND_CONNECTION, name)
}

/// Address of a remote outbound connection.
pub fn remote_connection_address(name: &str) -> ResourceAddress {
    ResourceAddress::remoting_subsystem().append(REMOTE_OUTBOUND_CONNECTION, name)
}

/// Build the add intent for a local outbound connection.
///
/// Fails if the name or the socket binding reference is blank. Options
/// without a key are skipped.
pub fn local_outbound_connection_add<K, V, I>(
    name: &str,
    socket_binding_ref: &str,
    options: I,
) -> Result<Intent>
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (Option<K>, V)>,
{
    let mut violations = Vec::new();
    if name.trim().is_empty() {
        violations.push("Connection name cannot be empty".to_string());
    }
    if socket_binding_ref.trim().is_empty() {
        violations.push(format!(
            "Outbound socket binding reference cannot be empty for connection named '{}'",
            name
        ));
    }
    if !violations.is_empty() {
        return Err(ProvisionError::Validation(violations));
    }

    let options: ConnectionOptions = options
        .into_iter()
        .filter_map(|(k, v)| k.map(|k| (k, v)))
        .collect();

    let mut intent = Intent::add(local_connection_address(name))
        .with(NAME, name)
        .with(SOCKET_BINDING_REF, socket_binding_ref);
    if !options.is_empty() {
        intent = intent.with(CONNECTION_CREATION_OPTIONS, options.to_value());
    }
    Ok(intent)
}

/// Handlers for both outbound connection types sharing one builder.
pub fn handlers(builder: Arc<dyn ConnectionBuilder>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(OutboundConnectionHandler::local(builder.clone())));
    registry.register(Arc::new(OutboundConnectionHandler::remote(builder)));
    registry
}

/// Publish the remoting endpoint as `remoting.endpoint.subsystem`.
pub fn publish_endpoint(engine: &LifecycleEngine, endpoint: Endpoint) -> Result<ServiceName> {
    engine.publish_value(SUBSYSTEM_ENDPOINT.clone(), Vec::new(), Arc::new(endpoint))?;
    Ok(SUBSYSTEM_ENDPOINT.clone())
}

/// Publish a resolved outbound socket binding under its service name.
pub fn publish_socket_binding(
    engine: &LifecycleEngine,
    binding: OutboundSocketBinding,
) -> Result<ServiceName> {
    let name = socket_binding_service(&binding.name);
    engine.publish_value(name.clone(), Vec::new(), Arc::new(binding))?;
    Ok(name)
}
