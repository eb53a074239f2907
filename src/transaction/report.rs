//! Transaction results.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::{ProvisionError, Result};
use crate::model::ResourceAddress;
use crate::service::ServiceName;

use super::intent::OperationKind;
use super::TransactionState;

/// Outcome of one transaction run.
#[derive(Debug, Serialize)]
pub struct TransactionReport {
    pub id: Uuid,
    pub op: OperationKind,
    pub address: ResourceAddress,
    /// Every state the transaction passed through, in order.
    pub history: Vec<TransactionState>,
    /// Services installed (add) or removed (remove), primary names first.
    pub services: Vec<ServiceName>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(rename = "errors", serialize_with = "serialize_outcome")]
    pub outcome: Result<()>,
}

fn serialize_outcome<S: Serializer>(
    outcome: &Result<()>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match outcome {
        Ok(()) => serializer.serialize_none(),
        Err(e) => serializer.collect_seq(e.messages()),
    }
}

impl TransactionReport {
    /// Final state.
    pub fn state(&self) -> TransactionState {
        self.history
            .last()
            .copied()
            .unwrap_or(TransactionState::Received)
    }

    pub fn is_committed(&self) -> bool {
        self.state() == TransactionState::Committed
    }

    /// Whether the transaction passed through `state`.
    pub fn reached(&self, state: TransactionState) -> bool {
        self.history.contains(&state)
    }

    pub fn error(&self) -> Option<&ProvisionError> {
        self.outcome.as_ref().err()
    }

    /// Display-ready failure messages; empty on success.
    pub fn messages(&self) -> Vec<String> {
        match &self.outcome {
            Ok(()) => Vec::new(),
            Err(e) => e.messages(),
        }
    }

    /// Wall-clock duration of the run.
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// The affected services on success, the failure otherwise.
    pub fn into_result(self) -> Result<Vec<ServiceName>> {
        self.outcome.map(|()| self.services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(outcome: Result<()>, history: Vec<TransactionState>) -> TransactionReport {
        let now = Utc::now();
        TransactionReport {
            id: Uuid::new_v4(),
            op: OperationKind::Add,
            address: ResourceAddress::remoting_subsystem(),
            history,
            services: vec![ServiceName::of(&["a"])],
            started_at: now,
            finished_at: now,
            outcome,
        }
    }

    #[test]
    fn test_committed_report() {
        let r = report(
            Ok(()),
            vec![TransactionState::Received, TransactionState::Committed],
        );
        assert!(r.is_committed());
        assert!(r.messages().is_empty());
        assert!(r.elapsed() >= chrono::Duration::zero());
        assert_eq!(r.into_result().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_report_serializes_messages() {
        let r = report(
            Err(ProvisionError::Validation(vec!["x".into(), "y".into()])),
            vec![TransactionState::Received, TransactionState::RolledBack],
        );
        assert_eq!(r.state(), TransactionState::RolledBack);
        assert!(!r.reached(TransactionState::Validated));
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["errors"], json!(["x", "y"]));
        assert_eq!(value["history"], json!(["RECEIVED", "ROLLED_BACK"]));
        assert_eq!(value["op"], json!("add"));
    }
}
