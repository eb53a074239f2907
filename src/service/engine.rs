//! Lifecycle engine: installs, starts and removes services.
//!
//! Each scheduled service gets one tokio task that waits for its
//! dependencies (scheduling registered-but-idle ones on demand), invokes the
//! factory once every dependency is `UP`, and publishes the result in the
//! registry. Scheduling is idempotent per registration, so concurrent
//! `start` calls share the same in-flight task and the factory runs once.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::{ProvisionError, Result};
use crate::log_component;

use super::descriptor::{ServiceDescriptor, ValueService};
use super::name::ServiceName;
use super::registry::{
    wait_settled, DependencyRegistry, NodeId, Removal, StartCompletion, StartPermit,
};
use super::state::{FailureReason, LifecycleState, ServiceStatus, ServiceValue};

/// Outcome of waiting for a service's dependencies.
enum DependencyWait {
    Ready,
    Failed {
        dependency: ServiceName,
        reason: String,
    },
    Cancelled,
}

/// Installs and tears down services against a shared [`DependencyRegistry`].
///
/// Cloning is cheap; clones drive the same registry.
#[derive(Clone, Default)]
pub struct LifecycleEngine {
    registry: Arc<DependencyRegistry>,
}

impl LifecycleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Arc<DependencyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DependencyRegistry> {
        &self.registry
    }

    /// Register a descriptor without starting it.
    ///
    /// The service starts when [`LifecycleEngine::start`] is called for it or
    /// when a scheduled dependent needs it.
    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<()> {
        self.registry.register(descriptor).map(|_| ())
    }

    /// Register a descriptor and schedule its start.
    ///
    /// Returns once the service is registered; use the registry or a
    /// [`super::VerificationGate`] to wait for it to settle. Must be called
    /// from within a tokio runtime; otherwise fails with
    /// [`ProvisionError::Runtime`] and registers nothing.
    pub fn install(&self, descriptor: ServiceDescriptor) -> Result<()> {
        let handle = current_runtime()?;
        let name = descriptor.name().clone();
        self.registry.register(descriptor)?;
        log_component!(info, "engine", "Installing service", service = %name);
        self.schedule_on(&handle, &name)
    }

    /// Publish an externally resolved value as an `UP` service.
    ///
    /// Same runtime requirement as [`LifecycleEngine::install`].
    pub fn publish_value(
        &self,
        name: ServiceName,
        aliases: Vec<ServiceName>,
        value: ServiceValue,
    ) -> Result<()> {
        let mut builder = ServiceDescriptor::builder(name, Arc::new(ValueService(value)));
        for alias in aliases {
            builder = builder.alias(alias);
        }
        self.install(builder.build()?)
    }

    /// Schedule `name` (primary or alias) to start. Idempotent.
    ///
    /// The start task is spawned on the current tokio runtime; without one
    /// this fails with [`ProvisionError::Runtime`].
    pub fn start(&self, name: &ServiceName) -> Result<()> {
        let handle = current_runtime()?;
        self.schedule_on(&handle, name)
    }

    fn schedule_on(&self, handle: &Handle, name: &ServiceName) -> Result<()> {
        if let Some(id) = self.registry.schedule(name)? {
            let engine = self.clone();
            handle.spawn(async move { engine.drive(id).await });
        }
        Ok(())
    }

    /// Unregister `name`, tearing the instance down if it is running.
    ///
    /// A service that is still starting is marked cancelled and torn down
    /// as soon as its factory returns. Teardown errors are logged, not
    /// returned.
    pub async fn remove(&self, name: &ServiceName) -> Result<()> {
        match self.registry.begin_removal(name)? {
            Removal::Done | Removal::Deferred => {}
            Removal::Stop(id, instance) => {
                let registry = self.registry.clone();
                // Teardown is synchronous service code; keep it off the runtime.
                let joined = tokio::task::spawn_blocking(move || {
                    if let Err(e) = instance.stop() {
                        error!(service = %instance.name(), "Teardown failed: {:#}", e);
                    }
                    registry.finish_removal(id);
                })
                .await;
                if let Err(e) = joined {
                    error!(service = %name, "Teardown task panicked: {}", e);
                }
            }
        }
        log_component!(info, "engine", "Removed service", service = %name);
        Ok(())
    }

    /// Remove every service, dependents before their dependencies.
    pub async fn shutdown(&self) {
        let mut order = self.registry.dependency_order();
        order.reverse();
        for name in order {
            if let Err(e) = self.remove(&name).await {
                error!(service = %name, "Failed to remove during shutdown: {}", e);
            }
        }
    }

    /// Start task for node `id`.
    async fn drive(self, id: NodeId) {
        let Some((descriptor, mut own)) = self.registry.node_handle(id) else {
            return;
        };
        let name = descriptor.name().clone();

        loop {
            match self
                .wait_for_dependencies(descriptor.dependencies(), &mut own)
                .await
            {
                DependencyWait::Cancelled => {
                    log_component!(debug, "engine", "Start cancelled", service = %name);
                    return;
                }
                DependencyWait::Failed { dependency, reason } => {
                    log_component!(
                        warn,
                        "engine",
                        "Dependency failed",
                        service = %name,
                        dependency = %dependency
                    );
                    self.registry
                        .fail_pending(id, FailureReason::DependencyFailed { dependency, reason });
                    return;
                }
                DependencyWait::Ready => {}
            }

            let (service, deps) = match self.registry.begin_start(id) {
                StartPermit::Granted { service, deps } => (service, deps),
                // A dependency went away between the wait and the check.
                StartPermit::NotReady => continue,
                StartPermit::Gone => return,
            };

            let result = service
                .start(&deps)
                .map_err(|e| FailureReason::Factory(format!("{:#}", e)));
            if let Err(FailureReason::Factory(message)) = &result {
                log_component!(error, "engine", "Service failed to start", service = %name, error = %message);
            }

            match self.registry.complete_start(id, result) {
                StartCompletion::Published => {
                    info!(service = %name, "Service is UP");
                }
                StartCompletion::Failed => {}
                StartCompletion::Cancelled(instance) => {
                    log_component!(info, "engine", "Tearing down cancelled install", service = %name);
                    if let Err(e) = instance.stop() {
                        error!(service = %name, "Teardown failed: {:#}", e);
                    }
                    self.registry.finish_removal(id);
                }
            }
            return;
        }
    }

    /// Wait until every dependency is `UP`, scheduling idle ones.
    async fn wait_for_dependencies(
        &self,
        dependencies: &[ServiceName],
        own: &mut watch::Receiver<ServiceStatus>,
    ) -> DependencyWait {
        for dependency in dependencies {
            loop {
                let mut rx = tokio::select! {
                    rx = self.registry.subscribe_when_registered(dependency) => rx,
                    _ = cancelled(own) => return DependencyWait::Cancelled,
                };
                if let Err(e) = self.start(dependency) {
                    // Removed between subscribe and schedule; wait again.
                    log_component!(debug, "engine", "Dependency vanished", dependency = %dependency, error = %e);
                }
                let settled = tokio::select! {
                    status = wait_settled(&mut rx) => status,
                    _ = cancelled(own) => return DependencyWait::Cancelled,
                };
                match settled {
                    Some(ServiceStatus::Up(_)) => break,
                    Some(ServiceStatus::Failed(reason)) => {
                        return DependencyWait::Failed {
                            dependency: dependency.clone(),
                            reason: reason.to_string(),
                        }
                    }
                    // Removed: wait for a new registration under this name.
                    _ => continue,
                }
            }
        }
        DependencyWait::Ready
    }
}

/// Resolves once the watched node is removed or dropped.
async fn cancelled(rx: &mut watch::Receiver<ServiceStatus>) {
    loop {
        if rx.borrow_and_update().state() == LifecycleState::Removed {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

impl std::fmt::Debug for LifecycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEngine")
            .field("services", &self.registry.len())
            .finish()
    }
}

fn current_runtime() -> Result<Handle> {
    Handle::try_current().map_err(|e| ProvisionError::Runtime(e.to_string()))
}

/// Convenience for callers holding a removal result they want to ignore
/// when the service is already gone.
pub fn ignore_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(ProvisionError::NotFound(_)) => Ok(()),
        other => other,
    }
}
