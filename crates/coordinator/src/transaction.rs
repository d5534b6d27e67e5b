//! Transaction record: catalog resolution and the commit/abort state machine
//!
//! A record aggregates every connector transaction opened under one
//! engine transaction id. Its own lock guards the catalog registry and
//! the status transition, so records never contend with each other.
//! Backend calls run outside the lock on the record's finisher.

use crate::catalog_metadata::CatalogMetadata;
use crate::connector_transaction::ConnectorTransaction;
use crate::error::{CoordinatorError, Result};
use crate::finisher::{BoundedFinisher, CompletionHandle, join_all};
use crate::info::TransactionInfo;
use chrono::{DateTime, Utc};
use federate_common::{Catalog, CatalogName, CatalogProvider, IsolationLevel, TransactionId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

const PENDING: u8 = 0;
const COMMITTED: u8 = 1;
const ABORTED: u8 = 2;

/// Outcome of a transaction; leaves `Pending` exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Pending,
    Committed,
    Aborted,
}

impl From<u8> for CompletionStatus {
    fn from(value: u8) -> Self {
        match value {
            COMMITTED => CompletionStatus::Committed,
            ABORTED => CompletionStatus::Aborted,
            _ => CompletionStatus::Pending,
        }
    }
}

/// Catalog state memoized for the lifetime of one transaction
#[derive(Default)]
struct CatalogRegistry {
    /// Provider answers by user-visible name, misses included
    catalogs_by_name: HashMap<String, Option<Arc<Catalog>>>,
    /// Resolved catalogs under each of their three target ids
    catalogs_by_id: HashMap<CatalogName, Arc<Catalog>>,
    catalog_metadata: HashMap<CatalogName, Arc<CatalogMetadata>>,
    connector_transactions: HashMap<CatalogName, Arc<ConnectorTransaction>>,
}

/// State of one open logical transaction
pub struct TransactionRecord {
    /// Transaction ID
    transaction_id: TransactionId,

    /// Passed through to every backend begin
    isolation_level: IsolationLevel,

    /// Rejects every write when set
    read_only: bool,

    /// Implicit single-statement transaction
    autocommit_context: bool,

    /// When the transaction was begun
    create_time: DateTime<Utc>,

    /// Catalog registry consulted on first use of each name
    provider: Arc<dyn CatalogProvider>,

    /// Runs this transaction's backend commit/abort calls
    finisher: BoundedFinisher,

    /// PENDING, COMMITTED or ABORTED; leaves PENDING by CAS only
    status: AtomicU8,

    /// The one catalog allowed to receive writes
    written_catalog: OnceLock<CatalogName>,

    /// Start of the current idle period; `None` while a statement runs
    idle_since: Mutex<Option<Instant>>,

    /// Resolved catalogs and open connector transactions
    registry: Mutex<CatalogRegistry>,
}

impl TransactionRecord {
    pub(crate) fn new(
        transaction_id: TransactionId,
        isolation_level: IsolationLevel,
        read_only: bool,
        autocommit_context: bool,
        provider: Arc<dyn CatalogProvider>,
        finisher: BoundedFinisher,
    ) -> Self {
        Self {
            transaction_id,
            isolation_level,
            read_only,
            autocommit_context,
            create_time: Utc::now(),
            provider,
            finisher,
            status: AtomicU8::new(PENDING),
            written_catalog: OnceLock::new(),
            idle_since: Mutex::new(None),
            registry: Mutex::new(CatalogRegistry::default()),
        }
    }

    /// Get the transaction ID
    pub fn id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Get the completion status
    pub fn status(&self) -> CompletionStatus {
        self.status.load(Ordering::SeqCst).into()
    }

    pub fn written_catalog(&self) -> Option<&CatalogName> {
        self.written_catalog.get()
    }

    /// A statement is executing; stop the idle clock
    pub fn set_active(&self) {
        *self.idle_since.lock() = None;
    }

    /// Waiting between statements; start the idle clock
    pub fn set_inactive(&self) {
        *self.idle_since.lock() = Some(Instant::now());
    }

    pub fn idle_time(&self) -> Duration {
        self.idle_since
            .lock()
            .map(|since| since.elapsed())
            .unwrap_or_default()
    }

    pub fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.idle_since
            .lock()
            .is_some_and(|since| since.elapsed() > idle_timeout)
    }

    pub fn check_open_transaction(&self) -> Result<()> {
        match self.status() {
            CompletionStatus::Pending => Ok(()),
            CompletionStatus::Committed => Err(CoordinatorError::IllegalCompletedState(
                "Current transaction already committed".to_string(),
            )),
            CompletionStatus::Aborted => Err(CoordinatorError::TransactionAlreadyAborted),
        }
    }

    /// Catalog name to primary target id, for every catalog this transaction can see
    pub fn catalog_names(&self) -> BTreeMap<String, CatalogName> {
        let registry = self.registry.lock();

        let mut names: BTreeMap<String, CatalogName> = registry
            .catalogs_by_name
            .values()
            .flatten()
            .map(|c| (c.catalog_name().to_string(), c.connector_catalog_name().clone()))
            .collect();

        for catalog in self.provider.catalogs() {
            names
                .entry(catalog.catalog_name().to_string())
                .or_insert_with(|| catalog.connector_catalog_name().clone());
        }
        names
    }

    /// Resolve a catalog name, asking the provider at most once per name
    pub fn connector_id(&self, catalog_name: &str) -> Option<CatalogName> {
        let mut registry = self.registry.lock();
        self.resolve(&mut registry, catalog_name)
            .map(|c| c.connector_catalog_name().clone())
    }

    /// Metadata for reading from `catalog_name`; `None` if no such catalog
    pub fn catalog_metadata_for_read(
        &self,
        catalog_name: &str,
    ) -> Result<Option<Arc<CatalogMetadata>>> {
        let mut registry = self.registry.lock();
        let Some(catalog) = self.resolve(&mut registry, catalog_name) else {
            return Ok(None);
        };
        self.transaction_catalog_metadata(&mut registry, catalog.connector_catalog_name())
            .map(Some)
    }

    /// Metadata for writing to `catalog_name`, claiming it as the written catalog
    pub fn catalog_metadata_for_write(&self, catalog_name: &str) -> Result<Arc<CatalogMetadata>> {
        let mut registry = self.registry.lock();
        let catalog = self
            .resolve(&mut registry, catalog_name)
            .ok_or_else(|| CoordinatorError::CatalogNotFound(catalog_name.to_string()))?;

        let target = catalog.connector_catalog_name();
        let metadata = self.transaction_catalog_metadata(&mut registry, target)?;
        self.check_connector_write(&registry, target)?;
        Ok(metadata)
    }

    /// Metadata by target id; the catalog must already have been resolved by name
    pub fn catalog_metadata(&self, target: &CatalogName) -> Result<Arc<CatalogMetadata>> {
        let mut registry = self.registry.lock();
        self.transaction_catalog_metadata(&mut registry, target)
    }

    fn resolve(&self, registry: &mut CatalogRegistry, catalog_name: &str) -> Option<Arc<Catalog>> {
        if let Some(known) = registry.catalogs_by_name.get(catalog_name) {
            return known.clone();
        }

        let catalog = self.provider.resolve(catalog_name);
        registry
            .catalogs_by_name
            .insert(catalog_name.to_string(), catalog.clone());

        if let Some(catalog) = &catalog {
            for target in catalog.target_ids() {
                registry
                    .catalogs_by_id
                    .insert(target.clone(), catalog.clone());
            }
        }
        catalog
    }

    fn transaction_catalog_metadata(
        &self,
        registry: &mut CatalogRegistry,
        target: &CatalogName,
    ) -> Result<Arc<CatalogMetadata>> {
        self.check_open_transaction()?;

        if let Some(metadata) = registry.catalog_metadata.get(target) {
            return Ok(metadata.clone());
        }

        let catalog = registry
            .catalogs_by_id
            .get(target)
            .cloned()
            .ok_or_else(|| CoordinatorError::CatalogNotFound(target.to_string()))?;

        let primary = self.connector_transaction(registry, &catalog, catalog.connector_catalog_name())?;
        let information_schema =
            self.connector_transaction(registry, &catalog, catalog.information_schema_id())?;
        let system_tables =
            self.connector_transaction(registry, &catalog, catalog.system_tables_id())?;

        let capabilities = catalog
            .connector(catalog.connector_catalog_name())
            .map(|connector| connector.capabilities())
            .unwrap_or_default();

        let metadata = Arc::new(CatalogMetadata::new(
            primary,
            information_schema,
            system_tables,
            catalog.security_management(),
            capabilities,
        ));
        for id in catalog.target_ids() {
            registry.catalog_metadata.insert(id.clone(), metadata.clone());
        }
        Ok(metadata)
    }

    /// Existing connector transaction for `target`, or a newly begun one
    fn connector_transaction(
        &self,
        registry: &mut CatalogRegistry,
        catalog: &Catalog,
        target: &CatalogName,
    ) -> Result<Arc<ConnectorTransaction>> {
        if let Some(existing) = registry.connector_transactions.get(target) {
            return Ok(existing.clone());
        }

        let connector = catalog
            .connector(target)
            .cloned()
            .ok_or_else(|| CoordinatorError::CatalogNotFound(target.to_string()))?;

        let transaction = Arc::new(ConnectorTransaction::begin(
            target.clone(),
            connector,
            self.transaction_id,
            self.isolation_level,
            self.read_only,
        )?);
        registry
            .connector_transactions
            .insert(target.clone(), transaction.clone());
        Ok(transaction)
    }

    fn check_connector_write(&self, registry: &CatalogRegistry, target: &CatalogName) -> Result<()> {
        self.check_open_transaction()?;

        let transaction = registry
            .connector_transactions
            .get(target)
            .ok_or_else(|| CoordinatorError::CatalogNotFound(target.to_string()))?;

        if self.read_only {
            return Err(CoordinatorError::ReadOnlyViolation);
        }

        let written = self.written_catalog.get_or_init(|| target.clone());
        if written != target {
            return Err(CoordinatorError::MultiCatalogWriteConflict {
                written: written.clone(),
            });
        }

        if transaction.is_single_statement_writes_only() && !self.autocommit_context {
            return Err(CoordinatorError::AutocommitWriteConflict(target.clone()));
        }
        Ok(())
    }

    /// Move `Pending` to `to` and snapshot the participants, atomically
    fn finish_with(&self, to: u8) -> std::result::Result<Vec<Arc<ConnectorTransaction>>, u8> {
        let registry = self.registry.lock();
        self.status
            .compare_exchange(PENDING, to, Ordering::SeqCst, Ordering::SeqCst)?;
        Ok(registry.connector_transactions.values().cloned().collect())
    }

    /// Commit every connector transaction
    ///
    /// The written catalog, if any, commits first and alone. Committing an
    /// already committed transaction succeeds without touching a backend.
    pub async fn commit(&self) -> Result<()> {
        let participants = match self.finish_with(COMMITTED) {
            Ok(participants) => participants,
            Err(COMMITTED) => return Ok(()),
            Err(_) => return Err(CoordinatorError::TransactionAlreadyAborted),
        };

        let result = match self.written_catalog.get() {
            None => self.commit_read_only(participants).await,
            Some(written) => self.commit_with_write(written, participants).await,
        };

        if result.is_ok() {
            tracing::debug!(transaction_id = %self.transaction_id, "Committed transaction");
        }
        result
    }

    async fn commit_read_only(&self, participants: Vec<Arc<ConnectorTransaction>>) -> Result<()> {
        let mut failure = None;
        for (catalog, result) in join_all(self.submit_commits(participants)).await {
            if let Err(e) = result {
                tracing::error!(
                    transaction_id = %self.transaction_id,
                    catalog = %catalog,
                    error = %e,
                    "Read-only connector should not throw exception on commit"
                );
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => {
                self.abort_connectors().await;
                Err(e)
            }
            None => Ok(()),
        }
    }

    async fn commit_with_write(
        &self,
        written: &CatalogName,
        participants: Vec<Arc<ConnectorTransaction>>,
    ) -> Result<()> {
        let (write, read_only): (Vec<_>, Vec<_>) = participants
            .into_iter()
            .partition(|txn| txn.catalog_name() == written);

        for txn in write {
            if let Err(e) = self.finisher.submit(move || txn.commit()).await {
                tracing::warn!(
                    transaction_id = %self.transaction_id,
                    catalog = %written,
                    error = %e,
                    "Write catalog failed to commit, aborting transaction"
                );
                self.abort_connectors().await;
                return Err(e);
            }
        }

        // The write has landed; read-only failures from here on cannot undo it
        for (catalog, result) in join_all(self.submit_commits(read_only)).await {
            if let Err(e) = result {
                tracing::error!(
                    transaction_id = %self.transaction_id,
                    catalog = %catalog,
                    error = %e,
                    "Read-only connector should not throw exception on commit"
                );
            }
        }
        Ok(())
    }

    fn submit_commits(
        &self,
        participants: Vec<Arc<ConnectorTransaction>>,
    ) -> Vec<(CatalogName, CompletionHandle)> {
        participants
            .into_iter()
            .map(|txn| {
                let catalog = txn.catalog_name().clone();
                (catalog, self.finisher.submit(move || txn.commit()))
            })
            .collect()
    }

    /// Roll back every connector transaction; rollback failures are logged, never returned
    pub async fn abort(&self) -> Result<()> {
        let participants = match self.finish_with(ABORTED) {
            Ok(participants) => participants,
            Err(ABORTED) => return Ok(()),
            Err(_) => {
                return Err(CoordinatorError::IllegalCompletedState(
                    "Current transaction already committed".to_string(),
                ));
            }
        };

        self.abort_participants(participants).await;
        tracing::debug!(transaction_id = %self.transaction_id, "Aborted transaction");
        Ok(())
    }

    /// Roll back every connector regardless of status; finished ones are skipped
    async fn abort_connectors(&self) {
        let participants = self
            .registry
            .lock()
            .connector_transactions
            .values()
            .cloned()
            .collect();
        self.abort_participants(participants).await;
    }

    async fn abort_participants(&self, participants: Vec<Arc<ConnectorTransaction>>) {
        let tasks = participants
            .into_iter()
            .map(|txn| {
                let catalog = txn.catalog_name().clone();
                (catalog, self.finisher.submit(move || txn.abort()))
            })
            .collect();

        for (catalog, result) in join_all(tasks).await {
            if let Err(e) = result {
                tracing::error!(
                    transaction_id = %self.transaction_id,
                    catalog = %catalog,
                    error = %e,
                    "Connector threw exception on abort"
                );
            }
        }
    }

    /// Get a point-in-time snapshot of this transaction
    pub fn info(&self) -> TransactionInfo {
        let mut catalog_names: Vec<CatalogName> = self
            .registry
            .lock()
            .connector_transactions
            .keys()
            .cloned()
            .collect();
        catalog_names.sort();

        TransactionInfo {
            transaction_id: self.transaction_id,
            isolation_level: self.isolation_level,
            read_only: self.read_only,
            autocommit_context: self.autocommit_context,
            create_time: self.create_time,
            idle_time: self.idle_time(),
            catalog_names,
            written_catalog: self.written_catalog.get().cloned(),
        }
    }
}
