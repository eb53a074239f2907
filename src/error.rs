//! Error types for svcgraph
//!
//! One error enum covers every layer: intent validation, registry conflicts,
//! service start failures, and verification timeouts. Uses `thiserror` for
//! `Display` and `Error` implementations.

use thiserror::Error;

use crate::model::ResourceAddress;
use crate::service::state::FailureReason;
use crate::service::{PendingService, ServiceName, VerificationFailure};

fn join<T: std::fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// The primary error type for svcgraph operations.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The intent is malformed. Lists every violated constraint.
    #[error("Validation failed: {}", join(.0, "; "))]
    Validation(Vec<String>),

    /// A service name or alias is already registered.
    #[error("Service '{0}' is already registered")]
    DuplicateService(ServiceName),

    /// A configuration resource already exists at the address.
    #[error("Resource '{0}' already exists")]
    DuplicateResource(ResourceAddress),

    /// Service, resource, or handler not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A service cannot be removed while running services depend on it.
    #[error("Service '{service}' is still required by: {}", join(.dependents, ", "))]
    InUse {
        service: ServiceName,
        dependents: Vec<ServiceName>,
    },

    /// Registration would close a dependency cycle. The path starts and
    /// ends with the same name.
    #[error("Cyclic dependency: {}", join(.0, " -> "))]
    CyclicDependency(Vec<ServiceName>),

    /// A service factory failed; the message is preserved verbatim.
    #[error("Failed to start service '{service}': {message}")]
    Factory {
        service: ServiceName,
        message: String,
    },

    /// A required dependency failed, so the service never started.
    #[error("Service '{service}' cannot start: dependency '{dependency}' failed: {reason}")]
    DependencyFailed {
        service: ServiceName,
        dependency: ServiceName,
        reason: String,
    },

    /// Verification did not complete in time.
    #[error("Timed out waiting for services: {}", join(.0, "; "))]
    Timeout(Vec<PendingService>),

    /// Several verification failures of different kinds.
    #[error("Verification failed: {}", join(.0, "; "))]
    Verification(Vec<VerificationFailure>),

    /// The transaction was aborted before it committed.
    #[error("Transaction aborted")]
    Aborted,

    /// A service start was requested outside a tokio runtime.
    #[error("No tokio runtime to start services on: {0}")]
    Runtime(String),

    /// Configuration-related errors (invalid config file, bad overrides).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProvisionError {
    /// Build the error for a failed verification.
    ///
    /// A single failure maps to its specific variant; several timeouts
    /// collapse into one `Timeout`; anything else stays a `Verification`.
    pub fn from_failures(mut failures: Vec<VerificationFailure>) -> Self {
        if failures.len() == 1 {
            let failure = failures.remove(0);
            return crate::service::registry::failure_error(&failure.service, failure.reason);
        }
        if !failures.is_empty() && failures.iter().all(VerificationFailure::is_timeout) {
            let pending = failures
                .into_iter()
                .map(|f| PendingService {
                    waiting_on: match f.reason {
                        FailureReason::Timeout { waiting_on } => waiting_on,
                        _ => Vec::new(),
                    },
                    service: f.service,
                })
                .collect();
            return ProvisionError::Timeout(pending);
        }
        ProvisionError::Verification(failures)
    }

    /// True for "slow dependency" errors, as opposed to broken ones.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProvisionError::Timeout(_))
    }

    /// Errors the caller can fix by resubmitting a corrected intent.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProvisionError::Validation(_)
                | ProvisionError::DuplicateService(_)
                | ProvisionError::DuplicateResource(_)
                | ProvisionError::NotFound(_)
                | ProvisionError::InUse { .. }
        )
    }

    /// Ordered, display-ready messages.
    pub fn messages(&self) -> Vec<String> {
        match self {
            ProvisionError::Validation(violations) => violations.clone(),
            ProvisionError::Timeout(pending) => pending
                .iter()
                .map(|p| format!("Timed out waiting for {}", p))
                .collect(),
            ProvisionError::Verification(failures) => {
                failures.iter().map(|f| f.to_string()).collect()
            }
            other => vec![other.to_string()],
        }
    }
}

/// A specialized `Result` type for svcgraph operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;
