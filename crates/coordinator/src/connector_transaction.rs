//! One backend's share of a logical transaction

use crate::error::{CoordinatorError, Result};
use federate_common::{
    CatalogName, Connector, ConnectorMetadata, ConnectorTransactionHandle, IsolationLevel,
    TransactionId,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Backend transaction handle plus the metadata view it was opened with
///
/// Exactly one of `commit`/`abort` reaches the backend; the finished flag
/// is claimed before the call and never cleared.
pub struct ConnectorTransaction {
    catalog_name: CatalogName,
    connector: Arc<dyn Connector>,
    handle: ConnectorTransactionHandle,
    metadata: Arc<dyn ConnectorMetadata>,
    finished: AtomicBool,
}

impl ConnectorTransaction {
    /// Open a backend transaction on `connector`
    pub(crate) fn begin(
        catalog_name: CatalogName,
        connector: Arc<dyn Connector>,
        transaction_id: TransactionId,
        isolation: IsolationLevel,
        read_only: bool,
    ) -> Result<Self> {
        let handle = connector
            .begin_transaction_for(transaction_id, isolation, read_only)
            .map_err(|e| CoordinatorError::connector(&catalog_name, e))?;

        let metadata = match connector.metadata(&handle) {
            Ok(metadata) => metadata,
            Err(e) => {
                // Nothing references the handle yet, so release it here
                if let Err(rollback) = connector.rollback(&handle) {
                    tracing::error!(
                        catalog = %catalog_name,
                        error = %rollback,
                        "Connector threw exception on abort"
                    );
                }
                return Err(CoordinatorError::connector(&catalog_name, e));
            }
        };

        tracing::debug!(
            transaction_id = %transaction_id,
            catalog = %catalog_name,
            "Began connector transaction"
        );

        Ok(Self {
            catalog_name,
            connector,
            handle,
            metadata,
            finished: AtomicBool::new(false),
        })
    }

    pub fn catalog_name(&self) -> &CatalogName {
        &self.catalog_name
    }

    pub fn is_single_statement_writes_only(&self) -> bool {
        self.connector.is_single_statement_writes_only()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Metadata view; only valid while the transaction is open
    pub fn metadata(&self) -> Arc<dyn ConnectorMetadata> {
        assert!(
            !self.is_finished(),
            "Connector transaction for {} already finished",
            self.catalog_name
        );
        self.metadata.clone()
    }

    /// Backend handle; only valid while the transaction is open
    pub fn transaction_handle(&self) -> ConnectorTransactionHandle {
        assert!(
            !self.is_finished(),
            "Connector transaction for {} already finished",
            self.catalog_name
        );
        self.handle.clone()
    }

    pub fn commit(&self) -> Result<()> {
        if self.claim_finish() {
            self.connector
                .commit(&self.handle)
                .map_err(|e| CoordinatorError::connector(&self.catalog_name, e))?;
        }
        Ok(())
    }

    pub fn abort(&self) -> Result<()> {
        if self.claim_finish() {
            self.connector
                .rollback(&self.handle)
                .map_err(|e| CoordinatorError::connector(&self.catalog_name, e))?;
        }
        Ok(())
    }

    fn claim_finish(&self) -> bool {
        self.finished
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
