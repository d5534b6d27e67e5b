//! Per-transaction view of one catalog and its three targets

use crate::connector_transaction::ConnectorTransaction;
use federate_common::{
    CatalogName, ConnectorCapability, ConnectorMetadata, ConnectorTransactionHandle,
    SecurityManagement,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Metadata and transaction handles a statement uses to touch a catalog
pub struct CatalogMetadata {
    primary: Arc<ConnectorTransaction>,
    information_schema: Arc<ConnectorTransaction>,
    system_tables: Arc<ConnectorTransaction>,
    security_management: SecurityManagement,
    capabilities: HashSet<ConnectorCapability>,
}

impl CatalogMetadata {
    pub(crate) fn new(
        primary: Arc<ConnectorTransaction>,
        information_schema: Arc<ConnectorTransaction>,
        system_tables: Arc<ConnectorTransaction>,
        security_management: SecurityManagement,
        capabilities: HashSet<ConnectorCapability>,
    ) -> Self {
        Self {
            primary,
            information_schema,
            system_tables,
            security_management,
            capabilities,
        }
    }

    /// Identity of the primary data target
    pub fn catalog_name(&self) -> &CatalogName {
        self.primary.catalog_name()
    }

    pub fn information_schema_id(&self) -> &CatalogName {
        self.information_schema.catalog_name()
    }

    pub fn system_tables_id(&self) -> &CatalogName {
        self.system_tables.catalog_name()
    }

    /// Primary target metadata
    pub fn metadata(&self) -> Arc<dyn ConnectorMetadata> {
        self.primary.metadata()
    }

    pub fn metadata_for(&self, target: &CatalogName) -> Option<Arc<dyn ConnectorMetadata>> {
        self.target(target).map(|txn| txn.metadata())
    }

    pub fn transaction_handle_for(&self, target: &CatalogName) -> Option<ConnectorTransactionHandle> {
        self.target(target).map(|txn| txn.transaction_handle())
    }

    pub fn security_management(&self) -> SecurityManagement {
        self.security_management
    }

    pub fn capabilities(&self) -> &HashSet<ConnectorCapability> {
        &self.capabilities
    }

    fn target(&self, target: &CatalogName) -> Option<&Arc<ConnectorTransaction>> {
        [&self.primary, &self.information_schema, &self.system_tables]
            .into_iter()
            .find(|txn| txn.catalog_name() == target)
    }
}

impl fmt::Debug for CatalogMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogMetadata")
            .field("catalog_name", self.catalog_name())
            .field("security_management", &self.security_management)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
