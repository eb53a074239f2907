//! Lifecycle states and the status snapshots published to watchers.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::name::ServiceName;

/// A resolved service value, shared between the registry and dependents.
pub type ServiceValue = Arc<dyn Any + Send + Sync>;

/// Lifecycle state of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Registered, waiting for dependencies or for a start request.
    Pending,
    /// Factory is running.
    Starting,
    /// Running; value is published.
    Up,
    /// Factory or a dependency failed. Terminal.
    Failed,
    /// Teardown in progress.
    Stopping,
    /// Torn down or cancelled. Terminal.
    Removed,
}

impl LifecycleState {
    /// Whether `self -> next` is a legal transition.
    ///
    /// Besides the main paths this allows `Pending -> Failed` (a dependency
    /// failed), `Pending -> Removed` (cancelled before start) and
    /// `Starting -> Stopping` (cancelled while the factory ran; the instance
    /// is torn down without ever being published).
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Pending, Failed)
                | (Pending, Removed)
                | (Starting, Up)
                | (Starting, Failed)
                | (Starting, Stopping)
                | (Up, Stopping)
                | (Stopping, Removed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Failed | LifecycleState::Removed)
    }

    /// Up or terminal: nothing more to wait for.
    pub fn is_settled(self) -> bool {
        self == LifecycleState::Up || self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Pending => "PENDING",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Up => "UP",
            LifecycleState::Failed => "FAILED",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a service did not reach `UP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The factory returned an error; the message is kept verbatim.
    Factory(String),
    /// A required dependency failed or was removed before this service started.
    DependencyFailed {
        dependency: ServiceName,
        reason: String,
    },
    /// The service was removed before it settled.
    Removed,
    /// No service with this name is registered.
    NotRegistered,
    /// Verification gave up while the service was still waiting.
    Timeout { waiting_on: Vec<ServiceName> },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Factory(msg) => write!(f, "{}", msg),
            FailureReason::DependencyFailed { dependency, reason } => {
                write!(f, "dependency '{}' failed: {}", dependency, reason)
            }
            FailureReason::Removed => write!(f, "removed before start completed"),
            FailureReason::NotRegistered => write!(f, "not registered"),
            FailureReason::Timeout { waiting_on } if waiting_on.is_empty() => {
                write!(f, "timed out")
            }
            FailureReason::Timeout { waiting_on } => {
                let names: Vec<String> = waiting_on.iter().map(|n| n.to_string()).collect();
                write!(f, "timed out waiting on {}", names.join(", "))
            }
        }
    }
}

/// Snapshot of a service published on its watch channel.
#[derive(Debug, Clone)]
pub enum ServiceStatus {
    Pending,
    Starting,
    Up(ServiceValue),
    Failed(FailureReason),
    Stopping,
    Removed,
}

impl ServiceStatus {
    pub fn state(&self) -> LifecycleState {
        match self {
            ServiceStatus::Pending => LifecycleState::Pending,
            ServiceStatus::Starting => LifecycleState::Starting,
            ServiceStatus::Up(_) => LifecycleState::Up,
            ServiceStatus::Failed(_) => LifecycleState::Failed,
            ServiceStatus::Stopping => LifecycleState::Stopping,
            ServiceStatus::Removed => LifecycleState::Removed,
        }
    }

    pub fn value(&self) -> Option<&ServiceValue> {
        match self {
            ServiceStatus::Up(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.state().is_settled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use LifecycleState::*;
        assert!(Pending.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Up));
        assert!(Up.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Removed));
        assert!(Starting.can_transition_to(Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        use LifecycleState::*;
        assert!(!Pending.can_transition_to(Up));
        assert!(!Up.can_transition_to(Removed));
        assert!(!Failed.can_transition_to(Starting));
        assert!(!Removed.can_transition_to(Pending));
        assert!(!Up.can_transition_to(Failed));
    }

    #[test]
    fn test_terminal_and_settled() {
        assert!(LifecycleState::Failed.is_terminal());
        assert!(LifecycleState::Removed.is_terminal());
        assert!(!LifecycleState::Up.is_terminal());
        assert!(LifecycleState::Up.is_settled());
        assert!(!LifecycleState::Starting.is_settled());
    }

    #[test]
    fn test_status_value_only_when_up() {
        let value: ServiceValue = Arc::new(7u32);
        let up = ServiceStatus::Up(value);
        assert_eq!(up.state(), LifecycleState::Up);
        assert_eq!(up.value().unwrap().downcast_ref::<u32>(), Some(&7));
        assert!(ServiceStatus::Pending.value().is_none());
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::Timeout {
            waiting_on: vec![ServiceName::of(&["network", "b"])],
        };
        assert_eq!(reason.to_string(), "timed out waiting on network.b");
        let reason = FailureReason::Factory("boom".into());
        assert_eq!(reason.to_string(), "boom");
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&LifecycleState::Up).unwrap();
        assert_eq!(json, "\"UP\"");
    }
}
