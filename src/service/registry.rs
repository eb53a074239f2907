//! Dependency registry: the single source of truth for service state.
//!
//! Every registered service lives in an arena keyed by a numeric id. Primary
//! names and aliases both map to that id, and are inserted and removed
//! together under one lock, so an alias is visible exactly when its primary
//! is. Each entry publishes its [`ServiceStatus`] on a `watch` channel;
//! callers waiting in [`DependencyRegistry::resolve`] or the verification
//! gate are woken by state changes rather than polling.
//!
//! Only the lifecycle engine mutates the registry (all mutators are
//! `pub(crate)`); everything else reads through the public API.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{ProvisionError, Result};
use crate::log_component;

use super::descriptor::{ResolvedDependencies, RunningInstance, Service, ServiceDescriptor};
use super::graph::DependencyGraph;
use super::name::ServiceName;
use super::state::{FailureReason, LifecycleState, ServiceStatus, ServiceValue};

pub(crate) type NodeId = u64;

struct Node {
    descriptor: ServiceDescriptor,
    status: watch::Sender<ServiceStatus>,
    /// A start task has been spawned for this node.
    scheduled: bool,
    /// Removed while starting; late completion must tear down.
    cancelled: bool,
    instance: Option<Arc<RunningInstance>>,
}

impl Node {
    fn state(&self) -> LifecycleState {
        self.status.borrow().state()
    }

    /// Apply a transition, refusing illegal ones.
    fn transition(&mut self, next: ServiceStatus) -> bool {
        let current = self.state();
        let target = next.state();
        if !current.can_transition_to(target) {
            warn!(
                service = %self.descriptor.name(),
                "Refusing illegal transition {} -> {}",
                current,
                target
            );
            return false;
        }
        debug!(service = %self.descriptor.name(), "{} -> {}", current, target);
        self.status.send_replace(next);
        true
    }
}

#[derive(Default)]
struct Arena {
    next_id: NodeId,
    nodes: HashMap<NodeId, Node>,
    /// Primary names and aliases of attached nodes.
    names: HashMap<ServiceName, NodeId>,
    /// Dependency name -> ids of registered nodes declaring it.
    dependents: HashMap<ServiceName, BTreeSet<NodeId>>,
}

impl Arena {
    fn lookup(&self, name: &ServiceName) -> Option<(NodeId, &Node)> {
        let id = *self.names.get(name)?;
        self.nodes.get(&id).map(|node| (id, node))
    }

    /// Graph of every attached node plus, optionally, a candidate descriptor.
    fn graph_with(&self, candidate: Option<&ServiceDescriptor>) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        let attached: HashSet<NodeId> = self.names.values().copied().collect();
        for id in attached {
            if let Some(node) = self.nodes.get(&id) {
                let desc = &node.descriptor;
                graph.add(desc.name(), desc.aliases(), desc.dependencies());
            }
        }
        if let Some(desc) = candidate {
            graph.add(desc.name(), desc.aliases(), desc.dependencies());
        }
        graph
    }

    /// Detach a node's names and its dependent back-references.
    ///
    /// The node itself stays in the arena until [`Arena::drop_node`].
    fn detach(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let names: Vec<ServiceName> = node.descriptor.all_names().cloned().collect();
        let deps: Vec<ServiceName> = node.descriptor.dependencies().to_vec();
        for name in names {
            if self.names.get(&name) == Some(&id) {
                self.names.remove(&name);
            }
        }
        for dep in deps {
            if let Some(set) = self.dependents.get_mut(&dep) {
                set.remove(&id);
                if set.is_empty() {
                    self.dependents.remove(&dep);
                }
            }
        }
    }

    fn drop_node(&mut self, id: NodeId) {
        self.detach(id);
        self.nodes.remove(&id);
    }

    /// Ids of nodes that declare a dependency on any name of `id`.
    fn dependents_of(&self, id: NodeId) -> BTreeSet<NodeId> {
        let mut out = BTreeSet::new();
        if let Some(node) = self.nodes.get(&id) {
            for name in node.descriptor.all_names() {
                if let Some(set) = self.dependents.get(name) {
                    out.extend(set.iter().copied());
                }
            }
        }
        out
    }
}

/// Result of a start attempt handed back to the engine.
pub(crate) enum StartPermit {
    /// All dependencies are `UP`; the node is now `STARTING`.
    Granted {
        service: Arc<dyn Service>,
        deps: ResolvedDependencies,
    },
    /// A dependency is no longer `UP`; wait again.
    NotReady,
    /// The node was removed or already settled.
    Gone,
}

/// What the engine must do after the factory returns.
pub(crate) enum StartCompletion {
    Published,
    Failed,
    /// Removed while starting; stop this instance then call `finish_removal`.
    Cancelled(Arc<RunningInstance>),
}

/// What the engine must do to finish a removal.
#[derive(Debug)]
pub(crate) enum Removal {
    /// Nothing left to tear down.
    Done,
    /// Stop this instance then call `finish_removal`.
    Stop(NodeId, Arc<RunningInstance>),
    /// Factory is still running; its completion will tear down.
    Deferred,
}

/// Registry of services keyed by [`ServiceName`].
pub struct DependencyRegistry {
    arena: Mutex<Arena>,
    registrations: watch::Sender<u64>,
}

impl Default for DependencyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyRegistry {
    pub fn new() -> Self {
        let (registrations, _) = watch::channel(0);
        Self {
            arena: Mutex::new(Arena::default()),
            registrations,
        }
    }

    fn arena(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Read API
    // ------------------------------------------------------------------

    /// Whether `name` (primary or alias) is registered.
    pub fn contains(&self, name: &ServiceName) -> bool {
        self.arena().names.contains_key(name)
    }

    /// Current status snapshot.
    pub fn status(&self, name: &ServiceName) -> Option<ServiceStatus> {
        self.arena()
            .lookup(name)
            .map(|(_, node)| node.status.borrow().clone())
    }

    pub fn state(&self, name: &ServiceName) -> Option<LifecycleState> {
        self.arena().lookup(name).map(|(_, node)| node.state())
    }

    /// Primary name for `name`, which may be an alias.
    pub fn primary_name(&self, name: &ServiceName) -> Option<ServiceName> {
        self.arena()
            .lookup(name)
            .map(|(_, node)| node.descriptor.name().clone())
    }

    /// All registered names, primary and alias, sorted.
    pub fn names(&self) -> Vec<ServiceName> {
        let mut names: Vec<ServiceName> = self.arena().names.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        let arena = self.arena();
        arena.names.values().collect::<HashSet<_>>().len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena().names.is_empty()
    }

    /// Primary names of registered services that depend on `name` or one of
    /// its aliases. Works for names that are not registered yet.
    pub fn dependents(&self, name: &ServiceName) -> Vec<ServiceName> {
        let arena = self.arena();
        let ids = match arena.lookup(name) {
            Some((id, _)) => arena.dependents_of(id),
            None => arena.dependents.get(name).cloned().unwrap_or_default(),
        };
        let mut out: Vec<ServiceName> = ids
            .iter()
            .filter_map(|id| arena.nodes.get(id))
            .map(|node| node.descriptor.name().clone())
            .collect();
        out.sort();
        out
    }

    /// Subscribe to state changes of `name`.
    pub fn subscribe(&self, name: &ServiceName) -> Result<watch::Receiver<ServiceStatus>> {
        self.arena()
            .lookup(name)
            .map(|(_, node)| node.status.subscribe())
            .ok_or_else(|| ProvisionError::NotFound(format!("service '{}'", name)))
    }

    /// Wait until `name` is `UP` or terminal and return its value.
    ///
    /// Blocks for as long as the service stays pending; use
    /// [`DependencyRegistry::resolve_within`] to bound the wait.
    pub async fn resolve(&self, name: &ServiceName) -> Result<ServiceValue> {
        let mut rx = self.subscribe(name)?;
        match wait_settled(&mut rx).await {
            Some(ServiceStatus::Up(value)) => Ok(value),
            Some(ServiceStatus::Failed(reason)) => Err(failure_error(name, reason)),
            _ => Err(ProvisionError::NotFound(format!("service '{}'", name))),
        }
    }

    /// [`DependencyRegistry::resolve`] with a deadline.
    pub async fn resolve_within(&self, name: &ServiceName, timeout: Duration) -> Result<ServiceValue> {
        match tokio::time::timeout(timeout, self.resolve(name)).await {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::Timeout(vec![super::verify::PendingService {
                service: name.clone(),
                waiting_on: self.unresolved_dependencies(name),
            }])),
        }
    }

    /// Transitive dependencies of `name` that are not `UP`, in discovery
    /// order. Unregistered names are included.
    pub fn unresolved_dependencies(&self, name: &ServiceName) -> Vec<ServiceName> {
        let arena = self.arena();
        let Some((_, root)) = arena.lookup(name) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut seen: HashSet<ServiceName> = HashSet::new();
        let mut queue: VecDeque<ServiceName> = root.descriptor.dependencies().iter().cloned().collect();
        while let Some(dep) = queue.pop_front() {
            if !seen.insert(dep.clone()) {
                continue;
            }
            match arena.lookup(&dep) {
                None => out.push(dep),
                Some((_, node)) if node.state() != LifecycleState::Up => {
                    out.push(dep);
                    queue.extend(node.descriptor.dependencies().iter().cloned());
                }
                Some(_) => {}
            }
        }
        out
    }

    /// Primary names in dependency order (dependencies first).
    pub fn dependency_order(&self) -> Vec<ServiceName> {
        self.arena().graph_with(None).topological_order()
    }

    // ------------------------------------------------------------------
    // Engine-only mutators
    // ------------------------------------------------------------------

    /// Register a descriptor in `PENDING`.
    ///
    /// Fails on a name or alias clash, or when the descriptor would close a
    /// dependency cycle. Nothing is registered on failure.
    pub(crate) fn register(&self, descriptor: ServiceDescriptor) -> Result<NodeId> {
        let id = {
            let mut arena = self.arena();

            if let Some(taken) = descriptor.all_names().find(|n| arena.names.contains_key(*n)) {
                return Err(ProvisionError::DuplicateService(taken.clone()));
            }

            if let Some(cycle) = arena
                .graph_with(Some(&descriptor))
                .find_cycle_from(descriptor.name())
            {
                return Err(ProvisionError::CyclicDependency(cycle));
            }

            let id = arena.next_id;
            arena.next_id += 1;
            for name in descriptor.all_names() {
                arena.names.insert(name.clone(), id);
            }
            for dep in descriptor.dependencies() {
                arena.dependents.entry(dep.clone()).or_default().insert(id);
            }
            log_component!(debug, "registry", "Registered service", service = %descriptor.name());
            let (status, _) = watch::channel(ServiceStatus::Pending);
            arena.nodes.insert(
                id,
                Node {
                    descriptor,
                    status,
                    scheduled: false,
                    cancelled: false,
                    instance: None,
                },
            );
            id
        };
        self.registrations.send_modify(|generation| *generation += 1);
        Ok(id)
    }

    /// Mark `name` scheduled. Returns the node id only for the first caller.
    pub(crate) fn schedule(&self, name: &ServiceName) -> Result<Option<NodeId>> {
        let mut arena = self.arena();
        let id = *arena
            .names
            .get(name)
            .ok_or_else(|| ProvisionError::NotFound(format!("service '{}'", name)))?;
        let Some(node) = arena.nodes.get_mut(&id) else {
            return Ok(None);
        };
        if node.scheduled {
            return Ok(None);
        }
        node.scheduled = true;
        Ok(Some(id))
    }

    /// Descriptor and status receiver of node `id`.
    pub(crate) fn node_handle(
        &self,
        id: NodeId,
    ) -> Option<(ServiceDescriptor, watch::Receiver<ServiceStatus>)> {
        self.arena()
            .nodes
            .get(&id)
            .map(|node| (node.descriptor.clone(), node.status.subscribe()))
    }

    /// Subscribe to `name`, waiting for it to be registered first.
    pub(crate) async fn subscribe_when_registered(
        &self,
        name: &ServiceName,
    ) -> watch::Receiver<ServiceStatus> {
        let mut registrations = self.registrations.subscribe();
        loop {
            if let Ok(rx) = self.subscribe(name) {
                return rx;
            }
            if registrations.changed().await.is_err() {
                // The sender lives as long as `self`; unreachable in practice.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Move `id` to `STARTING` if every dependency is still `UP`.
    pub(crate) fn begin_start(&self, id: NodeId) -> StartPermit {
        let mut arena = self.arena();
        let Some(node) = arena.nodes.get(&id) else {
            return StartPermit::Gone;
        };
        if node.cancelled || node.state() != LifecycleState::Pending {
            return StartPermit::Gone;
        }

        let mut values = HashMap::new();
        for dep in node.descriptor.dependencies() {
            match arena.lookup(dep).map(|(_, d)| d.status.borrow().clone()) {
                Some(ServiceStatus::Up(value)) => {
                    values.insert(dep.clone(), value);
                }
                _ => return StartPermit::NotReady,
            }
        }

        let Some(node) = arena.nodes.get_mut(&id) else {
            return StartPermit::Gone;
        };
        if !node.transition(ServiceStatus::Starting) {
            return StartPermit::Gone;
        }
        StartPermit::Granted {
            service: node.descriptor.service().clone(),
            deps: ResolvedDependencies::new(values),
        }
    }

    /// Record the factory result for `id`.
    pub(crate) fn complete_start(
        &self,
        id: NodeId,
        result: std::result::Result<ServiceValue, FailureReason>,
    ) -> StartCompletion {
        let mut arena = self.arena();
        let Some(node) = arena.nodes.get_mut(&id) else {
            return StartCompletion::Failed;
        };

        if node.cancelled {
            return match result {
                Ok(value) => {
                    let instance = Arc::new(RunningInstance::new(
                        node.descriptor.name().clone(),
                        value,
                        node.descriptor.service().clone(),
                    ));
                    node.transition(ServiceStatus::Stopping);
                    StartCompletion::Cancelled(instance)
                }
                Err(reason) => {
                    node.transition(ServiceStatus::Failed(reason));
                    arena.drop_node(id);
                    StartCompletion::Failed
                }
            };
        }

        match result {
            Ok(value) => {
                let instance = Arc::new(RunningInstance::new(
                    node.descriptor.name().clone(),
                    value.clone(),
                    node.descriptor.service().clone(),
                ));
                node.instance = Some(instance);
                node.transition(ServiceStatus::Up(value));
                StartCompletion::Published
            }
            Err(reason) => {
                node.transition(ServiceStatus::Failed(reason));
                StartCompletion::Failed
            }
        }
    }

    /// Fail a pending node because a dependency failed.
    pub(crate) fn fail_pending(&self, id: NodeId, reason: FailureReason) {
        let mut arena = self.arena();
        if let Some(node) = arena.nodes.get_mut(&id) {
            if node.state() == LifecycleState::Pending {
                node.transition(ServiceStatus::Failed(reason));
            }
        }
    }

    /// Start unregistering `name`.
    ///
    /// Fails with `NotFound` if absent and `InUse` while a running or
    /// starting service depends on it. On success the name and its aliases
    /// are no longer visible.
    pub(crate) fn begin_removal(&self, name: &ServiceName) -> Result<Removal> {
        let mut arena = self.arena();
        let (id, node) = arena
            .lookup(name)
            .ok_or_else(|| ProvisionError::NotFound(format!("service '{}'", name)))?;
        let primary = node.descriptor.name().clone();

        let busy: Vec<ServiceName> = arena
            .dependents_of(id)
            .iter()
            .filter_map(|dep_id| arena.nodes.get(dep_id))
            .filter(|dep| {
                matches!(
                    dep.state(),
                    LifecycleState::Up | LifecycleState::Starting | LifecycleState::Stopping
                )
            })
            .map(|dep| dep.descriptor.name().clone())
            .collect();
        if !busy.is_empty() {
            return Err(ProvisionError::InUse {
                service: primary,
                dependents: busy,
            });
        }

        let Some(node) = arena.nodes.get_mut(&id) else {
            return Err(ProvisionError::NotFound(format!("service '{}'", name)));
        };
        let removal = match node.state() {
            LifecycleState::Pending => {
                node.transition(ServiceStatus::Removed);
                arena.drop_node(id);
                Removal::Done
            }
            LifecycleState::Failed | LifecycleState::Removed => {
                arena.drop_node(id);
                Removal::Done
            }
            LifecycleState::Starting => {
                node.cancelled = true;
                arena.detach(id);
                Removal::Deferred
            }
            LifecycleState::Up => {
                let instance = node.instance.take();
                node.transition(ServiceStatus::Stopping);
                arena.detach(id);
                match instance {
                    Some(instance) => Removal::Stop(id, instance),
                    None => {
                        if let Some(node) = arena.nodes.get_mut(&id) {
                            node.transition(ServiceStatus::Removed);
                        }
                        arena.drop_node(id);
                        Removal::Done
                    }
                }
            }
            LifecycleState::Stopping => {
                return Err(ProvisionError::NotFound(format!("service '{}'", name)));
            }
        };
        log_component!(debug, "registry", "Unregistered service", service = %primary);
        Ok(removal)
    }

    /// Final `STOPPING -> REMOVED` step after teardown.
    pub(crate) fn finish_removal(&self, id: NodeId) {
        let mut arena = self.arena();
        if let Some(node) = arena.nodes.get_mut(&id) {
            node.transition(ServiceStatus::Removed);
        }
        arena.drop_node(id);
    }
}

/// Wait until the watched status is settled.
///
/// Returns `None` if the entry was dropped before settling.
pub(crate) async fn wait_settled(rx: &mut watch::Receiver<ServiceStatus>) -> Option<ServiceStatus> {
    loop {
        let status = rx.borrow_and_update().clone();
        if status.is_settled() {
            return Some(status);
        }
        if rx.changed().await.is_err() {
            let last = rx.borrow().clone();
            return last.is_settled().then_some(last);
        }
    }
}

/// Map a stored failure reason to the crate error for `name`.
pub(crate) fn failure_error(name: &ServiceName, reason: FailureReason) -> ProvisionError {
    match reason {
        FailureReason::Factory(message) => ProvisionError::Factory {
            service: name.clone(),
            message,
        },
        FailureReason::DependencyFailed { dependency, reason } => ProvisionError::DependencyFailed {
            service: name.clone(),
            dependency,
            reason,
        },
        FailureReason::Timeout { waiting_on } => {
            ProvisionError::Timeout(vec![super::verify::PendingService {
                service: name.clone(),
                waiting_on,
            }])
        }
        FailureReason::Removed | FailureReason::NotRegistered => {
            ProvisionError::NotFound(format!("service '{}'", name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::descriptor::ValueService;

    fn n(s: &str) -> ServiceName {
        ServiceName::parse(s).unwrap()
    }

    fn desc(name: &str, deps: &[&str]) -> ServiceDescriptor {
        let mut builder = ServiceDescriptor::builder(n(name), Arc::new(ValueService(Arc::new(()))));
        for d in deps {
            builder = builder.dependency(n(d));
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let reg = DependencyRegistry::new();
        reg.register(desc("svc.a", &[])).unwrap();
        assert!(reg.contains(&n("svc.a")));
        assert_eq!(reg.state(&n("svc.a")), Some(LifecycleState::Pending));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_register_duplicate_fails() {
        let reg = DependencyRegistry::new();
        reg.register(desc("svc.a", &[])).unwrap();
        let err = reg.register(desc("svc.a", &[])).unwrap_err();
        assert!(matches!(err, ProvisionError::DuplicateService(ref name) if name == &n("svc.a")));
    }

    #[test]
    fn test_register_alias_clash_fails() {
        let reg = DependencyRegistry::new();
        let first = ServiceDescriptor::builder(n("svc.a"), Arc::new(ValueService(Arc::new(()))))
            .alias(n("alias.a"))
            .build()
            .unwrap();
        reg.register(first).unwrap();
        let err = reg.register(desc("alias.a", &[])).unwrap_err();
        assert!(matches!(err, ProvisionError::DuplicateService(_)));
        assert_eq!(reg.primary_name(&n("alias.a")), Some(n("svc.a")));
    }

    #[test]
    fn test_register_cycle_fails_and_registers_nothing() {
        let reg = DependencyRegistry::new();
        reg.register(desc("a", &["b"])).unwrap();
        let err = reg.register(desc("b", &["a"])).unwrap_err();
        match err {
            ProvisionError::CyclicDependency(cycle) => {
                assert_eq!(cycle, vec![n("b"), n("a"), n("b")]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(!reg.contains(&n("b")));
    }

    #[test]
    fn test_dependents_tracks_unregistered_names() {
        let reg = DependencyRegistry::new();
        reg.register(desc("conn", &["binding"])).unwrap();
        assert_eq!(reg.dependents(&n("binding")), vec![n("conn")]);
    }

    #[test]
    fn test_unresolved_dependencies_is_transitive() {
        let reg = DependencyRegistry::new();
        reg.register(desc("conn", &["binding"])).unwrap();
        reg.register(desc("binding", &["interface"])).unwrap();
        assert_eq!(
            reg.unresolved_dependencies(&n("conn")),
            vec![n("binding"), n("interface")]
        );
    }

    #[test]
    fn test_removal_of_pending_clears_everything() {
        let reg = DependencyRegistry::new();
        reg.register(desc("conn", &["binding"])).unwrap();
        assert!(matches!(reg.begin_removal(&n("conn")).unwrap(), Removal::Done));
        assert!(reg.is_empty());
        assert!(reg.dependents(&n("binding")).is_empty());
    }

    #[test]
    fn test_removal_not_found() {
        let reg = DependencyRegistry::new();
        assert!(matches!(
            reg.begin_removal(&n("nope")),
            Err(ProvisionError::NotFound(_))
        ));
    }

    #[test]
    fn test_schedule_is_first_caller_only() {
        let reg = DependencyRegistry::new();
        let id = reg.register(desc("a", &[])).unwrap();
        assert_eq!(reg.schedule(&n("a")).unwrap(), Some(id));
        assert_eq!(reg.schedule(&n("a")).unwrap(), None);
        assert!(reg.schedule(&n("missing")).is_err());
    }

    #[test]
    fn test_begin_start_requires_dependencies_up() {
        let reg = DependencyRegistry::new();
        let id = reg.register(desc("conn", &["binding"])).unwrap();
        assert!(matches!(reg.begin_start(id), StartPermit::NotReady));

        let dep = reg.register(desc("binding", &[])).unwrap();
        assert!(matches!(reg.begin_start(dep), StartPermit::Granted { .. }));
        reg.complete_start(dep, Ok(Arc::new(5u8)));
        assert_eq!(reg.state(&n("binding")), Some(LifecycleState::Up));

        match reg.begin_start(id) {
            StartPermit::Granted { deps, .. } => assert_eq!(deps.len(), 1),
            _ => panic!("expected start to be granted"),
        }
    }

    #[test]
    fn test_in_use_blocks_removal() {
        let reg = DependencyRegistry::new();
        let dep = reg.register(desc("binding", &[])).unwrap();
        reg.begin_start(dep);
        reg.complete_start(dep, Ok(Arc::new(())));
        let id = reg.register(desc("conn", &["binding"])).unwrap();
        reg.begin_start(id);
        reg.complete_start(id, Ok(Arc::new(())));

        let err = reg.begin_removal(&n("binding")).unwrap_err();
        match err {
            ProvisionError::InUse { dependents, .. } => assert_eq!(dependents, vec![n("conn")]),
            other => panic!("expected InUse, got {other:?}"),
        }
    }

    #[test]
    fn test_removal_of_starting_is_deferred() {
        let reg = DependencyRegistry::new();
        let id = reg.register(desc("a", &[])).unwrap();
        reg.begin_start(id);
        assert!(matches!(reg.begin_removal(&n("a")).unwrap(), Removal::Deferred));
        assert!(!reg.contains(&n("a")));
        match reg.complete_start(id, Ok(Arc::new(()))) {
            StartCompletion::Cancelled(instance) => {
                assert!(instance.stop().unwrap());
                reg.finish_removal(id);
            }
            _ => panic!("expected cancelled completion"),
        }
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_returns_value_once_up() {
        let reg = Arc::new(DependencyRegistry::new());
        let id = reg.register(desc("a", &[])).unwrap();
        let waiter = {
            let reg = reg.clone();
            tokio::spawn(async move { reg.resolve(&n("a")).await })
        };
        reg.begin_start(id);
        reg.complete_start(id, Ok(Arc::new(42u32)));
        let value = waiter.await.unwrap().unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&42));
    }

    #[tokio::test]
    async fn test_resolve_propagates_failure() {
        let reg = DependencyRegistry::new();
        let id = reg.register(desc("a", &[])).unwrap();
        reg.begin_start(id);
        reg.complete_start(id, Err(FailureReason::Factory("no route".into())));
        let err = reg.resolve(&n("a")).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Factory { ref message, .. } if message == "no route"));
    }

    #[tokio::test]
    async fn test_resolve_within_times_out() {
        let reg = DependencyRegistry::new();
        reg.register(desc("a", &["never"])).unwrap();
        let err = reg
            .resolve_within(&n("a"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("never"));
    }

    #[tokio::test]
    async fn test_resolve_missing_is_not_found() {
        let reg = DependencyRegistry::new();
        assert!(matches!(
            reg.resolve(&n("ghost")).await,
            Err(ProvisionError::NotFound(_))
        ));
    }
}
