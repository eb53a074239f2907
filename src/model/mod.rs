//! Persistent configuration model.
//!
//! The model is a flat map from [`ResourceAddress`] to [`Resource`]. Readers
//! only ever see committed state: transactions stage their change in a
//! [`StagedModel`] overlay and merge it with [`ConfigModel::commit`].

pub mod address;
pub mod delta;

pub use address::{PathElement, ResourceAddress};
pub use delta::{ConfigurationDelta, StagedModel};

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{ProvisionError, Result};

/// Attributes of one configuration node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource {
    attributes: Map<String, Value>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_attributes(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }

    /// Builder-style setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// String attribute, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }
}

/// The committed configuration tree.
#[derive(Debug, Default)]
pub struct ConfigModel {
    resources: RwLock<BTreeMap<ResourceAddress, Resource>>,
}

impl ConfigModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ResourceAddress, Resource>> {
        self.resources.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ResourceAddress, Resource>> {
        self.resources.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.read().contains_key(address)
    }

    pub fn get(&self, address: &ResourceAddress) -> Option<Resource> {
        self.read().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of the committed tree.
    pub fn snapshot(&self) -> BTreeMap<ResourceAddress, Resource> {
        self.read().clone()
    }

    /// Direct children of `parent` with the given type, in address order.
    pub fn children(&self, parent: &ResourceAddress, resource_type: &str) -> Vec<ResourceAddress> {
        self.read()
            .keys()
            .filter(|a| parent.is_parent_of(a) && a.resource_type() == Some(resource_type))
            .cloned()
            .collect()
    }

    /// Merge a staged delta.
    ///
    /// Conflicts are re-checked under the write lock, so of two transactions
    /// that staged the same addition only the first commits.
    pub fn commit(&self, delta: ConfigurationDelta) -> Result<()> {
        let mut resources = self.write();
        match delta {
            ConfigurationDelta::Add { address, resource } => {
                if resources.contains_key(&address) {
                    return Err(ProvisionError::DuplicateResource(address));
                }
                info!(address = %address, "Committed resource");
                resources.insert(address, resource);
            }
            ConfigurationDelta::Remove { address } => {
                if resources.remove(&address).is_none() {
                    return Err(ProvisionError::NotFound(format!("resource '{}'", address)));
                }
                info!(address = %address, "Removed resource");
            }
        }
        Ok(())
    }
}
