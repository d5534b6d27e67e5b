//! In-memory mock backends for testing the transaction coordinator
//!
//! This crate provides connectors and a catalog registry that keep every
//! call in an [`EventLog`], so tests can assert how many times a backend
//! was asked to begin, commit or roll back, and in what order.

pub mod connector;
pub mod provider;

pub use connector::{MockConnector, MockMetadata, MockTransactionHandle};
pub use provider::MockCatalogProvider;

use federate_common::{IsolationLevel, TransactionId};
use parking_lot::Mutex;
use std::sync::Arc;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    Begin {
        connector: String,
        transaction_id: Option<TransactionId>,
        isolation: IsolationLevel,
        read_only: bool,
    },
    CommitStarted {
        connector: String,
    },
    Committed {
        connector: String,
    },
    RolledBack {
        connector: String,
    },
}

impl ConnectorEvent {
    pub fn connector(&self) -> &str {
        match self {
            ConnectorEvent::Begin { connector, .. }
            | ConnectorEvent::CommitStarted { connector }
            | ConnectorEvent::Committed { connector }
            | ConnectorEvent::RolledBack { connector } => connector,
        }
    }
}

/// Append-only call log, cheap to clone and share between connectors
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<ConnectorEvent>>>);

impl EventLog {
    pub fn record(&self, event: ConnectorEvent) {
        self.0.lock().push(event);
    }

    pub fn snapshot(&self) -> Vec<ConnectorEvent> {
        self.0.lock().clone()
    }

    /// Index of the first event matching `predicate`
    pub fn position(&self, predicate: impl Fn(&ConnectorEvent) -> bool) -> Option<usize> {
        self.0.lock().iter().position(predicate)
    }
}
