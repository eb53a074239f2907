//! Outbound connection handles and the service that builds them.
//!
//! The wire protocol lives behind [`ConnectionBuilder`]; the service only
//! wires the endpoint and socket binding it depends on into the builder.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::service::name::SUBSYSTEM_ENDPOINT;
use crate::service::{ResolvedDependencies, Service, ServiceName, ServiceValue};

use super::options::ConnectionOptions;

/// The local remoting endpoint connections are opened from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub name: String,
}

impl Endpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A resolved outbound socket binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundSocketBinding {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl OutboundSocketBinding {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// `host:port`
    pub fn destination(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Local (same-process transport) or remote connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Local,
    Remote,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKind::Local => write!(f, "local"),
            ConnectionKind::Remote => write!(f, "remote"),
        }
    }
}

/// What a connection factory is asked to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSpec {
    pub name: String,
    pub kind: ConnectionKind,
    pub options: ConnectionOptions,
    pub username: Option<String>,
    pub protocol: Option<String>,
}

impl ConnectionSpec {
    pub fn local(name: impl Into<String>, options: ConnectionOptions) -> Self {
        Self {
            name: name.into(),
            kind: ConnectionKind::Local,
            options,
            username: None,
            protocol: None,
        }
    }
}

/// A live outbound connection handle.
#[derive(Debug)]
pub struct OutboundConnection {
    spec: ConnectionSpec,
    endpoint: String,
    destination: String,
    closed: AtomicBool,
}

impl OutboundConnection {
    pub fn new(spec: ConnectionSpec, endpoint: &Endpoint, binding: &OutboundSocketBinding) -> Self {
        Self {
            spec,
            endpoint: endpoint.name.clone(),
            destination: binding.destination(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn kind(&self) -> ConnectionKind {
        self.spec.kind
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.spec.options
    }

    pub fn spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the connection. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            debug!(connection = %self.spec.name, "Closed outbound connection");
        }
        first
    }
}

/// Builds connection handles. Implementations own the wire protocol.
pub trait ConnectionBuilder: Send + Sync {
    fn connect(
        &self,
        endpoint: &Endpoint,
        binding: &OutboundSocketBinding,
        spec: &ConnectionSpec,
    ) -> anyhow::Result<OutboundConnection>;
}

/// In-process builder that records the destination without dialing it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnectionBuilder;

impl ConnectionBuilder for DefaultConnectionBuilder {
    fn connect(
        &self,
        endpoint: &Endpoint,
        binding: &OutboundSocketBinding,
        spec: &ConnectionSpec,
    ) -> anyhow::Result<OutboundConnection> {
        if binding.host.trim().is_empty() {
            anyhow::bail!("outbound socket binding '{}' has no host", binding.name);
        }
        Ok(OutboundConnection::new(spec.clone(), endpoint, binding))
    }
}

/// Service whose value is an `Arc<OutboundConnection>`.
pub(crate) struct OutboundConnectionService {
    pub(crate) spec: ConnectionSpec,
    pub(crate) binding: ServiceName,
    pub(crate) builder: Arc<dyn ConnectionBuilder>,
}

impl Service for OutboundConnectionService {
    fn start(&self, deps: &ResolvedDependencies) -> anyhow::Result<ServiceValue> {
        let endpoint = deps.get::<Endpoint>(&SUBSYSTEM_ENDPOINT)?;
        let binding = deps.get::<OutboundSocketBinding>(&self.binding)?;
        let connection = self.builder.connect(&endpoint, &binding, &self.spec)?;
        Ok(Arc::new(connection))
    }

    fn stop(&self, value: &ServiceValue) -> anyhow::Result<()> {
        if let Some(connection) = value.downcast_ref::<OutboundConnection>() {
            connection.close();
        }
        Ok(())
    }
}
