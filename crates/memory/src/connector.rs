//! Mock connector with call recording and failure injection

use crate::{ConnectorEvent, EventLog};
use federate_common::{
    Connector, ConnectorCapability, ConnectorError, ConnectorMetadata, ConnectorResult,
    ConnectorTransactionHandle, IsolationLevel, TransactionId,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Handle issued by [`MockConnector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockTransactionHandle {
    pub id: u64,
}

/// Metadata view returned for every open mock transaction
#[derive(Debug)]
pub struct MockMetadata {
    pub handle: MockTransactionHandle,
    schemas: Vec<String>,
}

impl ConnectorMetadata for MockMetadata {
    fn list_schema_names(&self) -> Vec<String> {
        self.schemas.clone()
    }
}

/// In-memory connector that records every backend call
pub struct MockConnector {
    name: String,
    events: EventLog,
    next_handle: AtomicU64,
    open: Mutex<HashSet<u64>>,
    schemas: Vec<String>,
    capabilities: HashSet<ConnectorCapability>,
    single_statement_writes_only: bool,
    internal: bool,
    begin_delay: Option<Duration>,
    commit_delay: Option<Duration>,
    fail_begin: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
}

impl MockConnector {
    /// Create a connector with its own event log
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: EventLog::default(),
            next_handle: AtomicU64::new(1),
            open: Mutex::new(HashSet::new()),
            schemas: vec!["default".to_string()],
            capabilities: HashSet::new(),
            single_statement_writes_only: false,
            internal: false,
            begin_delay: None,
            commit_delay: None,
            fail_begin: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
            fail_rollback: AtomicBool::new(false),
        }
    }

    /// Record into a log shared with other connectors
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn with_schemas(mut self, schemas: &[&str]) -> Self {
        self.schemas = schemas.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_capability(mut self, capability: ConnectorCapability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn single_statement_writes_only(mut self) -> Self {
        self.single_statement_writes_only = true;
        self
    }

    /// Behave like an engine-internal connector that binds to the transaction id
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Sleep inside `begin_transaction` to simulate a slow backend
    pub fn with_begin_delay(mut self, delay: Duration) -> Self {
        self.begin_delay = Some(delay);
        self
    }

    /// Sleep inside `commit` to simulate a slow backend
    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }

    pub fn fail_begins(&self, fail: bool) {
        self.fail_begin.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rollbacks(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn begin_count(&self) -> usize {
        self.count(|e| matches!(e, ConnectorEvent::Begin { .. }))
    }

    pub fn commit_count(&self) -> usize {
        self.count(|e| matches!(e, ConnectorEvent::CommitStarted { .. }))
    }

    pub fn rollback_count(&self) -> usize {
        self.count(|e| matches!(e, ConnectorEvent::RolledBack { .. }))
    }

    /// Transactions begun but neither committed nor rolled back
    pub fn open_transactions(&self) -> usize {
        self.open.lock().len()
    }

    fn count(&self, predicate: impl Fn(&ConnectorEvent) -> bool) -> usize {
        self.events
            .snapshot()
            .iter()
            .filter(|e| e.connector() == self.name && predicate(e))
            .count()
    }

    fn begin(
        &self,
        transaction_id: Option<TransactionId>,
        isolation: IsolationLevel,
        read_only: bool,
    ) -> ConnectorResult<ConnectorTransactionHandle> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(ConnectorError::Backend(format!(
                "{} refused to begin a transaction",
                self.name
            )));
        }

        if let Some(delay) = self.begin_delay {
            std::thread::sleep(delay);
        }

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.open.lock().insert(id);
        self.events.record(ConnectorEvent::Begin {
            connector: self.name.clone(),
            transaction_id,
            isolation,
            read_only,
        });
        Ok(ConnectorTransactionHandle::new(MockTransactionHandle { id }))
    }

    fn handle_id(&self, handle: &ConnectorTransactionHandle) -> ConnectorResult<u64> {
        handle
            .downcast_ref::<MockTransactionHandle>()
            .map(|h| h.id)
            .ok_or(ConnectorError::UnknownHandle)
    }
}

impl Connector for MockConnector {
    fn begin_transaction(
        &self,
        isolation: IsolationLevel,
        read_only: bool,
    ) -> ConnectorResult<ConnectorTransactionHandle> {
        self.begin(None, isolation, read_only)
    }

    fn begin_transaction_for(
        &self,
        transaction_id: TransactionId,
        isolation: IsolationLevel,
        read_only: bool,
    ) -> ConnectorResult<ConnectorTransactionHandle> {
        if self.internal {
            self.begin(Some(transaction_id), isolation, read_only)
        } else {
            self.begin_transaction(isolation, read_only)
        }
    }

    fn metadata(
        &self,
        handle: &ConnectorTransactionHandle,
    ) -> ConnectorResult<Arc<dyn ConnectorMetadata>> {
        let id = self.handle_id(handle)?;
        Ok(Arc::new(MockMetadata {
            handle: MockTransactionHandle { id },
            schemas: self.schemas.clone(),
        }))
    }

    fn commit(&self, handle: &ConnectorTransactionHandle) -> ConnectorResult<()> {
        let id = self.handle_id(handle)?;
        self.events.record(ConnectorEvent::CommitStarted {
            connector: self.name.clone(),
        });

        if let Some(delay) = self.commit_delay {
            std::thread::sleep(delay);
        }

        self.open.lock().remove(&id);
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(ConnectorError::Backend(format!("{} failed to commit", self.name)));
        }

        self.events.record(ConnectorEvent::Committed {
            connector: self.name.clone(),
        });
        Ok(())
    }

    fn rollback(&self, handle: &ConnectorTransactionHandle) -> ConnectorResult<()> {
        let id = self.handle_id(handle)?;
        self.events.record(ConnectorEvent::RolledBack {
            connector: self.name.clone(),
        });
        self.open.lock().remove(&id);

        if self.fail_rollback.load(Ordering::SeqCst) {
            return Err(ConnectorError::Backend(format!(
                "{} failed to roll back",
                self.name
            )));
        }
        Ok(())
    }

    fn is_single_statement_writes_only(&self) -> bool {
        self.single_statement_writes_only
    }

    fn capabilities(&self) -> HashSet<ConnectorCapability> {
        self.capabilities.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_is_recorded() {
        let connector = MockConnector::new("hive");
        let handle = connector
            .begin_transaction(IsolationLevel::ReadCommitted, false)
            .unwrap();
        assert_eq!(connector.open_transactions(), 1);

        connector.commit(&handle).unwrap();
        assert_eq!(connector.begin_count(), 1);
        assert_eq!(connector.commit_count(), 1);
        assert_eq!(connector.open_transactions(), 0);
    }

    #[test]
    fn test_foreign_handle_is_rejected() {
        let connector = MockConnector::new("hive");
        let foreign = ConnectorTransactionHandle::new("someone else's".to_string());
        assert!(matches!(
            connector.rollback(&foreign),
            Err(ConnectorError::UnknownHandle)
        ));
    }

    #[test]
    fn test_injected_rollback_failure_still_records_the_call() {
        let connector = MockConnector::new("hive");
        connector.fail_rollbacks(true);
        let handle = connector
            .begin_transaction(IsolationLevel::Serializable, true)
            .unwrap();

        assert!(connector.rollback(&handle).is_err());
        assert_eq!(connector.rollback_count(), 1);
    }

    #[test]
    fn test_internal_connector_keeps_transaction_id() {
        let connector = MockConnector::new("$system@hive").internal();
        let txn = TransactionId::new();
        connector
            .begin_transaction_for(txn, IsolationLevel::ReadUncommitted, false)
            .unwrap();

        match &connector.events().snapshot()[0] {
            ConnectorEvent::Begin { transaction_id, .. } => {
                assert_eq!(*transaction_id, Some(txn))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
