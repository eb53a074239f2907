//! Verification gate: turns asynchronous service startup into a yes/no
//! answer for the enclosing transaction.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;

use crate::log_component;

use super::name::ServiceName;
use super::registry::{wait_settled, DependencyRegistry};
use super::state::{FailureReason, ServiceStatus};

/// A service that had not settled when verification gave up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingService {
    pub service: ServiceName,
    /// Transitive dependencies that were not `UP` at the deadline.
    pub waiting_on: Vec<ServiceName>,
}

impl fmt::Display for PendingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.waiting_on.is_empty() {
            write!(f, "{}", self.service)
        } else {
            let names: Vec<String> = self.waiting_on.iter().map(|n| n.to_string()).collect();
            write!(f, "{} (waiting on {})", self.service, names.join(", "))
        }
    }
}

/// One observed service that did not reach `UP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFailure {
    pub service: ServiceName,
    pub reason: FailureReason,
}

impl VerificationFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self.reason, FailureReason::Timeout { .. })
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.service, self.reason)
    }
}

/// Observer over a set of in-flight installations.
///
/// ```
/// # tokio_test::block_on(async {
/// use std::sync::Arc;
/// use std::time::Duration;
/// use svcgraph::service::{LifecycleEngine, ServiceName, VerificationGate};
///
/// let engine = LifecycleEngine::new();
/// let name = ServiceName::of(&["example", "value"]);
/// engine.publish_value(name.clone(), vec![], Arc::new(1u8)).unwrap();
///
/// let mut gate = VerificationGate::new(engine.registry().clone());
/// gate.observe(name);
/// assert!(gate.wait(Duration::from_secs(1)).await.is_ok());
/// # })
/// ```
pub struct VerificationGate {
    registry: Arc<DependencyRegistry>,
    observed: Vec<ServiceName>,
}

impl VerificationGate {
    pub fn new(registry: Arc<DependencyRegistry>) -> Self {
        Self {
            registry,
            observed: Vec::new(),
        }
    }

    /// Add a service to the observed set. Duplicates are ignored.
    pub fn observe(&mut self, name: ServiceName) {
        if !self.observed.contains(&name) {
            self.observed.push(name);
        }
    }

    pub fn observed(&self) -> &[ServiceName] {
        &self.observed
    }

    /// Block until every observed service settles or `timeout` elapses.
    ///
    /// Returns `Ok(())` when all are `UP`; otherwise every failure in
    /// observation order. Services still pending at the deadline are
    /// reported as timeouts and left running; cleaning them up is the
    /// caller's job.
    pub async fn wait(&self, timeout: Duration) -> Result<(), Vec<VerificationFailure>> {
        await_services(&self.registry, &self.observed, timeout).await
    }
}

/// Wait for `names` to settle within `timeout`. See [`VerificationGate::wait`].
pub async fn await_services(
    registry: &DependencyRegistry,
    names: &[ServiceName],
    timeout: Duration,
) -> Result<(), Vec<VerificationFailure>> {
    let deadline = Instant::now() + timeout;

    let waits = names.iter().map(|name| async move {
        let mut rx = match registry.subscribe(name) {
            Ok(rx) => rx,
            Err(_) => return Some(FailureReason::NotRegistered),
        };
        match tokio::time::timeout_at(deadline, wait_settled(&mut rx)).await {
            Ok(Some(ServiceStatus::Up(_))) => None,
            Ok(Some(ServiceStatus::Failed(reason))) => Some(reason),
            Ok(_) => Some(FailureReason::Removed),
            Err(_) => Some(FailureReason::Timeout {
                waiting_on: registry.unresolved_dependencies(name),
            }),
        }
    });

    let failures: Vec<VerificationFailure> = join_all(waits)
        .await
        .into_iter()
        .zip(names)
        .filter_map(|(reason, name)| {
            reason.map(|reason| VerificationFailure {
                service: name.clone(),
                reason,
            })
        })
        .collect();

    if failures.is_empty() {
        log_component!(debug, "gate", "Verification passed", services = names.len());
        Ok(())
    } else {
        log_component!(warn, "gate", "Verification failed", failures = failures.len());
        Err(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::descriptor::{ResolvedDependencies, Service, ServiceDescriptor};
    use crate::service::engine::LifecycleEngine;
    use crate::service::state::ServiceValue;

    fn n(s: &str) -> ServiceName {
        ServiceName::parse(s).unwrap()
    }

    struct Failing;

    impl Service for Failing {
        fn start(&self, _deps: &ResolvedDependencies) -> anyhow::Result<ServiceValue> {
            anyhow::bail!("socket refused")
        }
    }

    #[tokio::test]
    async fn test_gate_passes_when_all_up() {
        let engine = LifecycleEngine::new();
        engine.publish_value(n("a"), vec![n("alias.a")], Arc::new(1u8)).unwrap();
        engine.publish_value(n("b"), vec![], Arc::new(2u8)).unwrap();

        let mut gate = VerificationGate::new(engine.registry().clone());
        gate.observe(n("a"));
        gate.observe(n("alias.a"));
        gate.observe(n("b"));
        gate.observe(n("b"));
        assert_eq!(gate.observed().len(), 3);
        assert!(gate.wait(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_gate_collects_every_failure() {
        let engine = LifecycleEngine::new();
        engine
            .install(ServiceDescriptor::builder(n("bad"), Arc::new(Failing)).build().unwrap())
            .unwrap();
        engine
            .install(
                ServiceDescriptor::builder(n("stuck"), Arc::new(Failing))
                    .dependency(n("missing"))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let failures = await_services(
            engine.registry(),
            &[n("bad"), n("stuck"), n("ghost")],
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();

        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0].reason, FailureReason::Factory("socket refused".into()));
        assert_eq!(
            failures[1].reason,
            FailureReason::Timeout {
                waiting_on: vec![n("missing")]
            }
        );
        assert!(failures[1].is_timeout());
        assert_eq!(failures[2].reason, FailureReason::NotRegistered);
    }

    #[tokio::test]
    async fn test_timeout_does_not_cancel_install() {
        let engine = LifecycleEngine::new();
        engine
            .install(
                ServiceDescriptor::builder(n("late"), Arc::new(crate::service::descriptor::ValueService(Arc::new(()))))
                    .dependency(n("dep"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let err = await_services(engine.registry(), &[n("late")], Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err[0].is_timeout());

        engine.publish_value(n("dep"), vec![], Arc::new(())).unwrap();
        assert!(await_services(engine.registry(), &[n("late")], Duration::from_secs(1))
            .await
            .is_ok());
    }

    #[test]
    fn test_pending_service_display() {
        let pending = PendingService {
            service: n("remoting.outbound-connection.to-node2"),
            waiting_on: vec![n("network.outbound-socket-binding.node2-binding")],
        };
        assert_eq!(
            pending.to_string(),
            "remoting.outbound-connection.to-node2 (waiting on network.outbound-socket-binding.node2-binding)"
        );
    }
}
