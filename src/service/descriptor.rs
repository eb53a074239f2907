//! Service descriptors, the factory contract, and running instances.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ProvisionError, Result};

use super::name::ServiceName;
use super::state::ServiceValue;

/// Factory and teardown logic for one service.
///
/// `start` receives the resolved values of every declared dependency and
/// must return the instance value or a descriptive error. It runs on the
/// engine's task, so it must not block on I/O beyond what is needed to build
/// the instance.
pub trait Service: Send + Sync + 'static {
    fn start(&self, deps: &ResolvedDependencies) -> anyhow::Result<ServiceValue>;

    /// Release the instance. The engine calls this at most once per started
    /// instance; implementations should still tolerate repeated calls.
    fn stop(&self, _value: &ServiceValue) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Service backed by a pre-resolved value. Used for dependencies owned by
/// other subsystems that are published rather than constructed.
pub(crate) struct ValueService(pub(crate) ServiceValue);

impl Service for ValueService {
    fn start(&self, _deps: &ResolvedDependencies) -> anyhow::Result<ServiceValue> {
        Ok(self.0.clone())
    }
}

/// Read-only map from dependency name to its resolved value.
#[derive(Default, Clone)]
pub struct ResolvedDependencies {
    values: HashMap<ServiceName, ServiceValue>,
}

impl ResolvedDependencies {
    pub(crate) fn new(values: HashMap<ServiceName, ServiceValue>) -> Self {
        Self { values }
    }

    /// Raw value for `name`.
    pub fn value(&self, name: &ServiceName) -> Option<&ServiceValue> {
        self.values.get(name)
    }

    /// Typed value for `name`; fails if the dependency is missing or holds a
    /// value of another type.
    pub fn get<T: Send + Sync + 'static>(&self, name: &ServiceName) -> anyhow::Result<Arc<T>> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("dependency '{}' was not injected", name))?;
        value.clone().downcast::<T>().map_err(|_| {
            anyhow::anyhow!(
                "dependency '{}' is not a {}",
                name,
                std::any::type_name::<T>()
            )
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Immutable description of a service to install.
#[derive(Clone)]
pub struct ServiceDescriptor {
    name: ServiceName,
    aliases: Vec<ServiceName>,
    dependencies: Vec<ServiceName>,
    service: Arc<dyn Service>,
}

impl ServiceDescriptor {
    pub fn builder(name: ServiceName, service: Arc<dyn Service>) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder {
            name,
            aliases: Vec::new(),
            dependencies: Vec::new(),
            service,
        }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn aliases(&self) -> &[ServiceName] {
        &self.aliases
    }

    /// Required dependencies in declaration order.
    pub fn dependencies(&self) -> &[ServiceName] {
        &self.dependencies
    }

    pub(crate) fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    /// Primary name followed by all aliases.
    pub fn all_names(&self) -> impl Iterator<Item = &ServiceName> {
        std::iter::once(&self.name).chain(self.aliases.iter())
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ServiceDescriptor`].
pub struct ServiceDescriptorBuilder {
    name: ServiceName,
    aliases: Vec<ServiceName>,
    dependencies: Vec<ServiceName>,
    service: Arc<dyn Service>,
}

impl ServiceDescriptorBuilder {
    pub fn alias(mut self, alias: ServiceName) -> Self {
        self.aliases.push(alias);
        self
    }

    pub fn dependency(mut self, dependency: ServiceName) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Validate and freeze the descriptor.
    ///
    /// Every problem is reported at once: duplicate dependencies, duplicate
    /// aliases, an alias equal to the primary name, and self-dependencies.
    pub fn build(self) -> Result<ServiceDescriptor> {
        let mut violations = Vec::new();

        let mut seen = HashSet::new();
        for dep in &self.dependencies {
            if !seen.insert(dep) {
                violations.push(format!(
                    "service '{}' declares dependency '{}' more than once",
                    self.name, dep
                ));
            }
        }

        let mut names = HashSet::new();
        names.insert(&self.name);
        for alias in &self.aliases {
            if !names.insert(alias) {
                violations.push(format!(
                    "service '{}' declares name '{}' more than once",
                    self.name, alias
                ));
            }
        }

        for dep in &self.dependencies {
            if names.contains(dep) {
                violations.push(format!("service '{}' depends on itself via '{}'", self.name, dep));
            }
        }

        if !violations.is_empty() {
            return Err(ProvisionError::Validation(violations));
        }

        Ok(ServiceDescriptor {
            name: self.name,
            aliases: self.aliases,
            dependencies: self.dependencies,
            service: self.service,
        })
    }
}

/// A started service: its value plus the logic to tear it down.
pub struct RunningInstance {
    name: ServiceName,
    value: ServiceValue,
    service: Arc<dyn Service>,
    stopped: AtomicBool,
}

impl RunningInstance {
    pub(crate) fn new(name: ServiceName, value: ServiceValue, service: Arc<dyn Service>) -> Self {
        Self {
            name,
            value,
            service,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn value(&self) -> &ServiceValue {
        &self.value
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Tear the instance down.
    ///
    /// Returns `Ok(false)` without calling the service when the instance was
    /// already stopped.
    pub fn stop(&self) -> anyhow::Result<bool> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.service.stop(&self.value)?;
        Ok(true)
    }
}

impl fmt::Debug for RunningInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningInstance")
            .field("name", &self.name)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
