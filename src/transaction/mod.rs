//! Configuration transactions.
//!
//! A transaction moves one [`Intent`] through
//! `RECEIVED -> VALIDATED -> STAGED -> INSTALLING -> COMMITTED`, or ends in
//! `ROLLED_BACK` with the runtime services it registered torn down and its
//! staged model change discarded.

pub mod controller;
pub mod handler;
pub mod intent;
pub mod report;

pub use controller::{AbortHandle, OperationController, Transaction};
pub use handler::{HandlerRegistry, ResourceHandler};
pub use intent::{Intent, OperationKind};
pub use report::TransactionReport;

use std::fmt;

use serde::Serialize;

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Received,
    Validated,
    Staged,
    Installing,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionState::Received => "RECEIVED",
            TransactionState::Validated => "VALIDATED",
            TransactionState::Staged => "STAGED",
            TransactionState::Installing => "INSTALLING",
            TransactionState::Committed => "COMMITTED",
            TransactionState::RolledBack => "ROLLED_BACK",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
