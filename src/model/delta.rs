//! Staged configuration changes.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{ProvisionError, Result};

use super::{ConfigModel, Resource, ResourceAddress};

/// A proposed change to one configuration node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConfigurationDelta {
    Add {
        address: ResourceAddress,
        resource: Resource,
    },
    Remove {
        address: ResourceAddress,
    },
}

impl ConfigurationDelta {
    pub fn address(&self) -> &ResourceAddress {
        match self {
            ConfigurationDelta::Add { address, .. } | ConfigurationDelta::Remove { address } => {
                address
            }
        }
    }
}

/// Transaction-local overlay over the committed model.
///
/// Reads through the overlay see the staged delta applied; readers of the
/// underlying [`ConfigModel`] do not. Dropping the overlay discards the delta.
#[derive(Debug)]
pub struct StagedModel {
    base: Arc<ConfigModel>,
    delta: Option<ConfigurationDelta>,
}

impl StagedModel {
    pub fn new(base: Arc<ConfigModel>) -> Self {
        Self { base, delta: None }
    }

    /// Stage `delta`, checking it against the committed model.
    pub fn stage(&mut self, delta: ConfigurationDelta) -> Result<()> {
        if self.delta.is_some() {
            return Err(ProvisionError::Validation(vec![
                "A change is already staged in this transaction".to_string(),
            ]));
        }
        match &delta {
            ConfigurationDelta::Add { address, .. } if self.base.contains(address) => {
                return Err(ProvisionError::DuplicateResource(address.clone()));
            }
            ConfigurationDelta::Remove { address } if !self.base.contains(address) => {
                return Err(ProvisionError::NotFound(format!("resource '{}'", address)));
            }
            _ => {}
        }
        self.delta = Some(delta);
        Ok(())
    }

    pub fn delta(&self) -> Option<&ConfigurationDelta> {
        self.delta.as_ref()
    }

    /// Read with the staged delta applied.
    pub fn get(&self, address: &ResourceAddress) -> Option<Resource> {
        match &self.delta {
            Some(ConfigurationDelta::Add { address: a, resource }) if a == address => {
                Some(resource.clone())
            }
            Some(ConfigurationDelta::Remove { address: a }) if a == address => None,
            _ => self.base.get(address),
        }
    }

    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.get(address).is_some()
    }

    /// Merge the staged delta into the committed model. A no-op when
    /// nothing is staged.
    pub fn commit(mut self) -> Result<()> {
        match self.delta.take() {
            Some(delta) => self.base.commit(delta),
            None => Ok(()),
        }
    }

    /// Drop the staged delta, returning it.
    pub fn discard(&mut self) -> Option<ConfigurationDelta> {
        self.delta.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(name: &str) -> ResourceAddress {
        ResourceAddress::remoting_subsystem().append("local-outbound-connection", name)
    }

    #[test]
    fn test_staged_add_invisible_until_commit() {
        let model = Arc::new(ConfigModel::new());
        let mut staged = StagedModel::new(model.clone());
        staged
            .stage(ConfigurationDelta::Add {
                address: addr("a"),
                resource: Resource::new().with("k", "v"),
            })
            .unwrap();

        assert!(staged.contains(&addr("a")));
        assert!(!model.contains(&addr("a")));

        staged.commit().unwrap();
        assert!(model.contains(&addr("a")));
    }

    #[test]
    fn test_staged_remove_hides_resource() {
        let model = Arc::new(ConfigModel::new());
        model
            .commit(ConfigurationDelta::Add {
                address: addr("a"),
                resource: Resource::new(),
            })
            .unwrap();

        let mut staged = StagedModel::new(model.clone());
        staged
            .stage(ConfigurationDelta::Remove { address: addr("a") })
            .unwrap();
        assert!(!staged.contains(&addr("a")));
        assert!(model.contains(&addr("a")));

        assert!(staged.discard().is_some());
        assert!(staged.contains(&addr("a")));
    }

    #[test]
    fn test_stage_checks_conflicts() {
        let model = Arc::new(ConfigModel::new());
        let mut staged = StagedModel::new(model.clone());
        assert!(matches!(
            staged.stage(ConfigurationDelta::Remove { address: addr("x") }),
            Err(ProvisionError::NotFound(_))
        ));

        model
            .commit(ConfigurationDelta::Add {
                address: addr("x"),
                resource: Resource::new(),
            })
            .unwrap();
        assert!(matches!(
            staged.stage(ConfigurationDelta::Add {
                address: addr("x"),
                resource: Resource::new(),
            }),
            Err(ProvisionError::DuplicateResource(_))
        ));
        assert!(staged.delta().is_none());
    }

    #[test]
    fn test_only_one_delta_per_overlay() {
        let mut staged = StagedModel::new(Arc::new(ConfigModel::new()));
        let add = |n: &str| ConfigurationDelta::Add {
            address: addr(n),
            resource: Resource::new(),
        };
        staged.stage(add("a")).unwrap();
        assert!(staged.stage(add("b")).is_err());
        assert_eq!(staged.delta().map(|d| d.address().clone()), Some(addr("a")));
    }
}
