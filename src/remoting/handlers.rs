//! Handlers for `local-outbound-connection` and `remote-outbound-connection`
//! resources.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ProvisionError, Result};
use crate::model::{Resource, ResourceAddress};
use crate::service::name::SUBSYSTEM_ENDPOINT;
use crate::service::{ServiceDescriptor, ServiceName};
use crate::transaction::{Intent, ResourceHandler};

use super::connection::{
    ConnectionBuilder, ConnectionKind, ConnectionSpec, OutboundConnectionService,
};
use super::options::ConnectionOptions;
use super::{
    alias_service, connection_service, socket_binding_service, CONNECTION_CREATION_OPTIONS,
    LOCAL_OUTBOUND_CONNECTION, NAME, PROTOCOL, REMOTE_OUTBOUND_CONNECTION, SOCKET_BINDING_REF,
    USERNAME,
};

const LOCAL_ATTRIBUTES: &[&str] = &[NAME, SOCKET_BINDING_REF, CONNECTION_CREATION_OPTIONS];
const REMOTE_ATTRIBUTES: &[&str] = &[
    NAME,
    SOCKET_BINDING_REF,
    CONNECTION_CREATION_OPTIONS,
    USERNAME,
    PROTOCOL,
];

/// Protocols a remote outbound connection may use.
pub const REMOTE_PROTOCOLS: &[&str] = &["remote", "http-remoting", "https-remoting"];
const DEFAULT_PROTOCOL: &str = "remote";

/// Handler for one outbound connection resource type.
pub struct OutboundConnectionHandler {
    kind: ConnectionKind,
    builder: Arc<dyn ConnectionBuilder>,
}

impl OutboundConnectionHandler {
    pub fn local(builder: Arc<dyn ConnectionBuilder>) -> Self {
        Self {
            kind: ConnectionKind::Local,
            builder,
        }
    }

    pub fn remote(builder: Arc<dyn ConnectionBuilder>) -> Self {
        Self {
            kind: ConnectionKind::Remote,
            builder,
        }
    }

    fn known_attributes(&self) -> &'static [&'static str] {
        match self.kind {
            ConnectionKind::Local => LOCAL_ATTRIBUTES,
            ConnectionKind::Remote => REMOTE_ATTRIBUTES,
        }
    }

    fn connection_name<'a>(address: &'a ResourceAddress) -> Result<&'a str> {
        address
            .name()
            .ok_or_else(|| ProvisionError::NotFound(format!("connection name in '{}'", address)))
    }

    fn spec(&self, address: &ResourceAddress, resource: &Resource) -> Result<ConnectionSpec> {
        let name = Self::connection_name(address)?;
        let options = ConnectionOptions::from_value(
            resource
                .get(CONNECTION_CREATION_OPTIONS)
                .unwrap_or(&Value::Null),
        )
        .map_err(ProvisionError::Validation)?;
        Ok(ConnectionSpec {
            name: name.to_string(),
            kind: self.kind,
            options,
            username: resource.get_str(USERNAME).map(str::to_string),
            protocol: resource.get_str(PROTOCOL).map(str::to_string),
        })
    }
}

/// Required non-blank string attribute.
fn required_string<'a>(
    intent: &'a Intent,
    key: &str,
    violations: &mut Vec<String>,
) -> Option<&'a str> {
    match intent.attribute(key) {
        None | Some(Value::Null) => {
            violations.push(format!("'{}' is required", key));
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            violations.push(format!("'{}' must not be blank", key));
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            violations.push(format!("'{}' must be a string", key));
            None
        }
    }
}

/// Optional string attribute; `null` counts as absent.
fn optional_string<'a>(
    intent: &'a Intent,
    key: &str,
    violations: &mut Vec<String>,
) -> Option<&'a str> {
    match intent.attribute(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            violations.push(format!("'{}' must be a string", key));
            None
        }
    }
}

#[async_trait]
impl ResourceHandler for OutboundConnectionHandler {
    fn resource_type(&self) -> &str {
        match self.kind {
            ConnectionKind::Local => LOCAL_OUTBOUND_CONNECTION,
            ConnectionKind::Remote => REMOTE_OUTBOUND_CONNECTION,
        }
    }

    async fn validate(&self, intent: &Intent) -> Result<Resource> {
        let mut violations = Vec::new();

        if intent.address.parent() != Some(ResourceAddress::remoting_subsystem()) {
            violations.push(format!(
                "'{}' must be a child of {}",
                intent.address,
                ResourceAddress::remoting_subsystem()
            ));
        }

        let name = required_string(intent, NAME, &mut violations);
        if let (Some(name), Some(addressed)) = (name, intent.address.name()) {
            if name != addressed {
                violations.push(format!(
                    "'{}' is '{}' but the address names '{}'",
                    NAME, name, addressed
                ));
            }
        }
        let binding = required_string(intent, SOCKET_BINDING_REF, &mut violations);

        let options = match ConnectionOptions::from_value(
            intent
                .attribute(CONNECTION_CREATION_OPTIONS)
                .unwrap_or(&Value::Null),
        ) {
            Ok(options) => options,
            Err(mut bad) => {
                violations.append(&mut bad);
                ConnectionOptions::new()
            }
        };

        let known = self.known_attributes();
        for key in intent.attributes.keys() {
            if !known.contains(&key.as_str()) {
                violations.push(format!(
                    "Unknown attribute '{}' for {}",
                    key,
                    self.resource_type()
                ));
            }
        }

        let mut username = None;
        let mut protocol = None;
        if self.kind == ConnectionKind::Remote {
            username = optional_string(intent, USERNAME, &mut violations);
            let requested = optional_string(intent, PROTOCOL, &mut violations);
            if let Some(p) = requested {
                if !REMOTE_PROTOCOLS.contains(&p) {
                    violations.push(format!(
                        "'{}' must be one of {}, got '{}'",
                        PROTOCOL,
                        REMOTE_PROTOCOLS.join(", "),
                        p
                    ));
                }
            }
            protocol = Some(requested.unwrap_or(DEFAULT_PROTOCOL));
        }

        if !violations.is_empty() {
            return Err(ProvisionError::Validation(violations));
        }

        let mut resource = Resource::new()
            .with(NAME, name.unwrap_or_default())
            .with(SOCKET_BINDING_REF, binding.unwrap_or_default())
            .with(CONNECTION_CREATION_OPTIONS, options.to_value());
        if let Some(username) = username {
            resource.set(USERNAME, username);
        }
        if let Some(protocol) = protocol {
            resource.set(PROTOCOL, protocol);
        }
        Ok(resource)
    }

    fn service_names(&self, address: &ResourceAddress, _resource: &Resource) -> Vec<ServiceName> {
        match address.name() {
            Some(name) => vec![connection_service(name), alias_service(self.kind, name)],
            None => Vec::new(),
        }
    }

    fn descriptors(
        &self,
        address: &ResourceAddress,
        resource: &Resource,
    ) -> Result<Vec<ServiceDescriptor>> {
        let spec = self.spec(address, resource)?;
        let binding_ref = resource.get_str(SOCKET_BINDING_REF).ok_or_else(|| {
            ProvisionError::Validation(vec![format!("'{}' is required", SOCKET_BINDING_REF)])
        })?;
        let binding = socket_binding_service(binding_ref);

        let primary = connection_service(&spec.name);
        let alias = alias_service(self.kind, &spec.name);
        let service = OutboundConnectionService {
            spec,
            binding: binding.clone(),
            builder: self.builder.clone(),
        };

        let descriptor = ServiceDescriptor::builder(primary, Arc::new(service))
            .alias(alias)
            .dependency(SUBSYSTEM_ENDPOINT.clone())
            .dependency(binding)
            .build()?;
        Ok(vec![descriptor])
    }
}
