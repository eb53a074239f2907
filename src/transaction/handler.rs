//! Resource handlers: per-type knowledge of how a configuration node maps
//! to runtime services.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ProvisionError, Result};
use crate::model::{Resource, ResourceAddress};
use crate::service::{ServiceDescriptor, ServiceName};

use super::intent::Intent;

/// Handles add/remove intents for one resource type.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Resource type this handler owns (last address element type).
    fn resource_type(&self) -> &str;

    /// Check an add intent and build the resource to stage.
    ///
    /// Reports every violated constraint in one `Validation` error.
    async fn validate(&self, intent: &Intent) -> Result<Resource>;

    /// Every service name (primary and aliases) the resource installs.
    fn service_names(&self, address: &ResourceAddress, resource: &Resource) -> Vec<ServiceName>;

    /// Descriptors to install for the resource.
    fn descriptors(
        &self,
        address: &ResourceAddress,
        resource: &Resource,
    ) -> Result<Vec<ServiceDescriptor>>;
}

/// Handlers keyed by resource type.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ResourceHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A handler for the same type is replaced.
    pub fn register(&mut self, handler: Arc<dyn ResourceHandler>) {
        self.handlers
            .insert(handler.resource_type().to_string(), handler);
    }

    pub fn has(&self, resource_type: &str) -> bool {
        self.handlers.contains_key(resource_type)
    }

    /// Handler for the resource type at `address`.
    pub fn for_address(&self, address: &ResourceAddress) -> Result<Arc<dyn ResourceHandler>> {
        address
            .resource_type()
            .and_then(|t| self.handlers.get(t))
            .cloned()
            .ok_or_else(|| ProvisionError::NotFound(format!("handler for '{}'", address)))
    }

    /// Registered resource types, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.types())
            .finish()
    }
}
