//! Transaction table
//!
//! Process-wide registry of open transactions. Commit and abort remove the
//! record before finishing it, so a concurrent lookup never sees a
//! half-finished transaction. An optional background task aborts
//! transactions that stay idle past the configured timeout.

use crate::catalog_metadata::CatalogMetadata;
use crate::config::TransactionManagerConfig;
use crate::error::{CoordinatorError, Result};
use crate::finisher::{BoundedFinisher, CompletionHandle};
use crate::info::TransactionInfo;
use crate::transaction::TransactionRecord;
use dashmap::DashMap;
use federate_common::{
    CatalogName, CatalogProvider, ConnectorTransactionHandle, IsolationLevel, TransactionId,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Isolation level used by [`TransactionManager::begin_default`]
pub const DEFAULT_ISOLATION: IsolationLevel = IsolationLevel::ReadUncommitted;

/// Read-only flag used by [`TransactionManager::begin_default`]
pub const DEFAULT_READ_ONLY: bool = false;

/// Registry of every open transaction
pub struct TransactionManager {
    /// Timeouts and finishing concurrency
    config: TransactionManagerConfig,

    /// Resolves catalog names for every transaction
    provider: Arc<dyn CatalogProvider>,

    /// Runtime captured at construction; commit, abort and the sweep run here
    runtime: Handle,

    /// Open transactions by id
    transactions: DashMap<TransactionId, Arc<TransactionRecord>>,

    /// Background tasks
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TransactionManager {
    /// Create a manager on the current tokio runtime
    pub fn new(config: TransactionManagerConfig, provider: Arc<dyn CatalogProvider>) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| CoordinatorError::Config(format!("no tokio runtime available: {}", e)))?;

        Ok(Self {
            config,
            provider,
            runtime,
            transactions: DashMap::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Create a manager with the test configuration
    pub fn for_testing(provider: Arc<dyn CatalogProvider>) -> Result<Self> {
        Self::new(TransactionManagerConfig::for_testing(), provider)
    }

    /// Get the configuration
    pub fn config(&self) -> &TransactionManagerConfig {
        &self.config
    }

    /// Start the idle sweep; it stops on `shutdown` or when the manager is dropped
    pub fn start(self: &Arc<Self>) {
        self.spawn_sweep(
            self.config.idle_check_interval,
            Self::clean_up_expired_transactions,
        );
    }

    /// Run `pass` every `period`; a failing pass is logged and the next one still runs
    fn spawn_sweep<F>(self: &Arc<Self>, period: Duration, pass: F)
    where
        F: Fn(&TransactionManager) + Send + Sync + 'static,
    {
        let manager: Weak<Self> = Arc::downgrade(self);
        let pass = Arc::new(pass);

        let task = self.runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let pass = pass.clone();
                if let Err(e) = tokio::spawn(async move { (*pass)(&*manager) }).await {
                    tracing::error!(error = %e, "Unexpected error cleaning up expired transactions");
                }
            }
        });
        self.tasks.lock().push(task);
    }

    /// Stop background tasks; open transactions are left untouched
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Open a transaction and return its id
    ///
    /// The transaction starts active; the idle clock runs only after `set_inactive`.
    pub fn begin(
        &self,
        isolation_level: IsolationLevel,
        read_only: bool,
        autocommit_context: bool,
    ) -> TransactionId {
        let transaction_id = TransactionId::new();
        let record = Arc::new(TransactionRecord::new(
            transaction_id,
            isolation_level,
            read_only,
            autocommit_context,
            self.provider.clone(),
            BoundedFinisher::new(self.runtime.clone(), self.config.max_finishing_concurrency),
        ));

        let previous = self.transactions.insert(transaction_id, record);
        assert!(previous.is_none(), "Duplicate transaction ID: {}", transaction_id);

        tracing::debug!(
            transaction_id = %transaction_id,
            isolation = %isolation_level,
            read_only,
            autocommit_context,
            "Began transaction"
        );
        transaction_id
    }

    /// Open a read-write transaction at the default isolation level
    pub fn begin_default(&self, autocommit_context: bool) -> TransactionId {
        self.begin(DEFAULT_ISOLATION, DEFAULT_READ_ONLY, autocommit_context)
    }

    /// Check if the transaction is still in the table
    pub fn transaction_exists(&self, transaction_id: TransactionId) -> bool {
        self.transactions.contains_key(&transaction_id)
    }

    /// Number of transactions in the table
    pub fn active_transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Get a snapshot of one transaction
    pub fn get_info(&self, transaction_id: TransactionId) -> Result<TransactionInfo> {
        Ok(self.record(transaction_id)?.info())
    }

    /// Get a snapshot of every open transaction
    pub fn get_all_transaction_infos(&self) -> Vec<TransactionInfo> {
        // Release the shard guards before touching any record lock
        let records: Vec<_> = self
            .transactions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.iter().map(|record| record.info()).collect()
    }

    pub fn get_catalog_names(&self, transaction_id: TransactionId) -> Result<BTreeMap<String, CatalogName>> {
        Ok(self.record(transaction_id)?.catalog_names())
    }

    pub fn get_catalog_metadata_for_read(
        &self,
        transaction_id: TransactionId,
        catalog_name: &str,
    ) -> Result<Option<Arc<CatalogMetadata>>> {
        self.record(transaction_id)?
            .catalog_metadata_for_read(catalog_name)
    }

    pub fn get_catalog_metadata_for_write(
        &self,
        transaction_id: TransactionId,
        catalog_name: &str,
    ) -> Result<Arc<CatalogMetadata>> {
        self.record(transaction_id)?
            .catalog_metadata_for_write(catalog_name)
    }

    pub fn get_catalog_metadata(
        &self,
        transaction_id: TransactionId,
        target: &CatalogName,
    ) -> Result<Arc<CatalogMetadata>> {
        self.record(transaction_id)?.catalog_metadata(target)
    }

    pub fn get_connector_transaction_handle(
        &self,
        transaction_id: TransactionId,
        target: &CatalogName,
    ) -> Result<ConnectorTransactionHandle> {
        self.get_catalog_metadata(transaction_id, target)?
            .transaction_handle_for(target)
            .ok_or_else(|| CoordinatorError::CatalogNotFound(target.to_string()))
    }

    /// Mark a statement as running; fails unless the transaction is open
    pub fn check_and_set_active(&self, transaction_id: TransactionId) -> Result<()> {
        let record = self.record(transaction_id)?;
        record.check_open_transaction()?;
        record.set_active();
        Ok(())
    }

    pub fn set_active(&self, transaction_id: TransactionId) {
        if let Some(record) = self.try_record(transaction_id) {
            record.set_active();
        }
    }

    /// Start the idle clock; unknown ids are ignored
    pub fn set_inactive(&self, transaction_id: TransactionId) {
        if let Some(record) = self.try_record(transaction_id) {
            record.set_inactive();
        }
    }

    /// Remove the transaction and commit it in the background
    ///
    /// Dropping the returned handle does not cancel the commit.
    pub fn async_commit(&self, transaction_id: TransactionId) -> CompletionHandle {
        match self.transactions.remove(&transaction_id) {
            Some((_, record)) => {
                CompletionHandle::spawned(self.runtime.spawn(async move { record.commit().await }))
            }
            None => CompletionHandle::ready(Err(CoordinatorError::NotInTransaction(transaction_id))),
        }
    }

    /// Remove the transaction and abort it in the background
    pub fn async_abort(&self, transaction_id: TransactionId) -> CompletionHandle {
        match self.transactions.remove(&transaction_id) {
            Some((_, record)) => self.spawn_abort(record),
            None => CompletionHandle::ready(Err(CoordinatorError::NotInTransaction(transaction_id))),
        }
    }

    /// Commit and wait for every backend
    pub async fn commit(&self, transaction_id: TransactionId) -> Result<()> {
        self.async_commit(transaction_id).await
    }

    /// Abort and wait for every backend; backend failures are only logged
    pub async fn abort(&self, transaction_id: TransactionId) -> Result<()> {
        self.async_abort(transaction_id).await
    }

    /// Abort in the background and keep the record so later statements see the failure
    pub fn fail(&self, transaction_id: TransactionId) {
        let Some(record) = self.try_record(transaction_id) else {
            return;
        };

        self.runtime.spawn(async move {
            if let Err(e) = record.abort().await {
                tracing::error!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Connector threw exception on abort"
                );
            }
        });
    }

    /// Remove and abort every inactive transaction idle past the timeout
    pub fn clean_up_expired_transactions(&self) {
        let idle_timeout = self.config.idle_timeout;
        let expired: Vec<TransactionId> = self
            .transactions
            .iter()
            .filter(|entry| entry.value().is_expired(idle_timeout))
            .map(|entry| *entry.key())
            .collect();

        for transaction_id in expired {
            let Some((_, record)) = self
                .transactions
                .remove_if(&transaction_id, |_, record| record.is_expired(idle_timeout))
            else {
                continue;
            };

            tracing::info!(
                transaction_id = %transaction_id,
                idle_time_ms = record.idle_time().as_millis() as u64,
                "Removing expired transaction"
            );

            let abort = self.spawn_abort(record);
            self.runtime.spawn(async move {
                if let Err(e) = abort.await {
                    tracing::error!(
                        transaction_id = %transaction_id,
                        error = %e,
                        "Failed to abort expired transaction"
                    );
                }
            });
        }
    }

    fn spawn_abort(&self, record: Arc<TransactionRecord>) -> CompletionHandle {
        CompletionHandle::spawned(self.runtime.spawn(async move { record.abort().await }))
    }

    fn record(&self, transaction_id: TransactionId) -> Result<Arc<TransactionRecord>> {
        self.try_record(transaction_id)
            .ok_or(CoordinatorError::NotInTransaction(transaction_id))
    }

    fn try_record(&self, transaction_id: TransactionId) -> Option<Arc<TransactionRecord>> {
        self.transactions
            .get(&transaction_id)
            .map(|entry| entry.value().clone())
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use federate_memory::{MockCatalogProvider, MockConnector};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> (TransactionManager, Arc<MockConnector>) {
        let provider = Arc::new(MockCatalogProvider::new());
        let hive = Arc::new(MockConnector::new("hive"));
        provider.add_catalog("hive", hive.clone());
        (TransactionManager::for_testing(provider).unwrap(), hive)
    }

    #[test]
    fn test_new_requires_runtime() {
        let provider = Arc::new(MockCatalogProvider::new());
        let result = TransactionManager::for_testing(provider);
        assert!(matches!(result, Err(CoordinatorError::Config(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = TransactionManagerConfig {
            max_finishing_concurrency: 0,
            ..TransactionManagerConfig::for_testing()
        };
        let result = TransactionManager::new(config, Arc::new(MockCatalogProvider::new()));
        assert!(matches!(result, Err(CoordinatorError::Config(_))));
    }

    #[tokio::test]
    async fn test_begin_default() {
        let (manager, _) = manager();
        let id = manager.begin_default(true);

        let info = manager.get_info(id).unwrap();
        assert_eq!(info.isolation_level, IsolationLevel::ReadUncommitted);
        assert!(!info.read_only);
        assert!(info.autocommit_context);
        assert_eq!(manager.active_transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let (manager, _) = manager();
        let id = TransactionId::new();

        assert!(!manager.transaction_exists(id));
        assert!(matches!(
            manager.get_info(id),
            Err(CoordinatorError::NotInTransaction(missing)) if missing == id
        ));
        assert!(matches!(
            manager.commit(id).await,
            Err(CoordinatorError::NotInTransaction(_))
        ));
        assert!(matches!(
            manager.check_and_set_active(id),
            Err(CoordinatorError::NotInTransaction(_))
        ));

        // Tolerated
        manager.set_active(id);
        manager.set_inactive(id);
        manager.fail(id);
    }

    #[tokio::test]
    async fn test_connector_transaction_handle_by_target() {
        let (manager, _) = manager();
        let id = manager.begin_default(false);

        let metadata = manager
            .get_catalog_metadata_for_read(id, "hive")
            .unwrap()
            .unwrap();
        let primary = manager
            .get_connector_transaction_handle(id, metadata.catalog_name())
            .unwrap();
        let system = manager
            .get_connector_transaction_handle(id, metadata.system_tables_id())
            .unwrap();

        assert!(!primary.same_handle(&system));
        assert!(primary.same_handle(&metadata.transaction_handle_for(metadata.catalog_name()).unwrap()));
    }

    #[tokio::test]
    async fn test_sweep_survives_a_failing_pass() {
        let provider = Arc::new(MockCatalogProvider::new());
        let manager = Arc::new(TransactionManager::for_testing(provider).unwrap());
        let passes = Arc::new(AtomicUsize::new(0));

        let counter = passes.clone();
        manager.spawn_sweep(Duration::from_millis(5), move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first sweep pass failed");
            }
        });

        for _ in 0..200 {
            if passes.load(Ordering::SeqCst) >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(passes.load(Ordering::SeqCst) >= 3);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_sweep_skips_active_transactions() {
        let provider = Arc::new(MockCatalogProvider::new());
        let config = TransactionManagerConfig {
            idle_timeout: Duration::from_millis(1),
            ..TransactionManagerConfig::for_testing()
        };
        let manager = TransactionManager::new(config, provider).unwrap();

        let active = manager.begin_default(false);
        let idle = manager.begin_default(false);
        manager.set_inactive(idle);
        tokio::time::sleep(Duration::from_millis(10)).await;

        manager.clean_up_expired_transactions();
        assert!(manager.transaction_exists(active));
        assert!(!manager.transaction_exists(idle));
    }
}
