//! Service runtime: dependency registry, lifecycle engine, and verification.
//!
//! Services are declared with a [`ServiceDescriptor`] (name, aliases,
//! required dependencies, and a [`Service`] factory). The
//! [`LifecycleEngine`] installs them into the [`DependencyRegistry`],
//! starting each only after all of its dependencies are `UP`. A
//! [`VerificationGate`] waits for a set of installs to settle.

pub mod descriptor;
pub mod engine;
mod graph;
pub mod name;
pub mod registry;
pub mod state;
pub mod verify;

pub use descriptor::{ResolvedDependencies, RunningInstance, Service, ServiceDescriptor};
pub use engine::LifecycleEngine;
pub use name::ServiceName;
pub use registry::DependencyRegistry;
pub use state::{FailureReason, LifecycleState, ServiceStatus, ServiceValue};
pub use verify::{await_services, PendingService, VerificationFailure, VerificationGate};
