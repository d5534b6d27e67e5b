//! Shared fixtures for coordinator integration tests
#![allow(dead_code)]

use federate_coordinator::{TransactionManager, TransactionManagerConfig};
use federate_memory::{ConnectorEvent, EventLog, MockCatalogProvider, MockConnector};
use std::sync::Arc;
use std::time::Duration;

/// Manager wired to a mock catalog registry whose connectors share one event log
pub struct Fixture {
    pub manager: Arc<TransactionManager>,
    pub provider: Arc<MockCatalogProvider>,
    pub events: EventLog,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(TransactionManagerConfig::for_testing())
    }

    pub fn with_config(config: TransactionManagerConfig) -> Self {
        let provider = Arc::new(MockCatalogProvider::new());
        let manager = TransactionManager::new(config, provider.clone()).unwrap();
        Self {
            manager: Arc::new(manager),
            provider,
            events: EventLog::default(),
        }
    }

    /// Register a plain catalog named `name`
    pub fn catalog(&self, name: &str) -> Arc<MockConnector> {
        self.catalog_with(MockConnector::new(name))
    }

    /// Register a pre-configured connector under its own name
    pub fn catalog_with(&self, connector: MockConnector) -> Arc<MockConnector> {
        let connector = Arc::new(connector.with_events(self.events.clone()));
        self.provider.add_catalog(connector.name(), connector.clone());
        connector
    }

    /// Position of the first `CommitStarted` recorded for `connector`
    pub fn commit_started(&self, connector: &str) -> usize {
        self.events
            .position(|e| matches!(e, ConnectorEvent::CommitStarted { connector: c } if c == connector))
            .unwrap_or_else(|| panic!("{} never started a commit", connector))
    }

    /// Position of the first `Committed` recorded for `connector`
    pub fn committed(&self, connector: &str) -> usize {
        self.events
            .position(|e| matches!(e, ConnectorEvent::Committed { connector: c } if c == connector))
            .unwrap_or_else(|| panic!("{} never committed", connector))
    }
}

/// Configuration whose idle sweep fires quickly
pub fn fast_expiry() -> TransactionManagerConfig {
    TransactionManagerConfig {
        idle_timeout: Duration::from_millis(50),
        idle_check_interval: Duration::from_millis(10),
        ..TransactionManagerConfig::default()
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
