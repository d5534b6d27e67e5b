//! Mock catalog registry

use crate::connector::MockConnector;
use federate_common::{Catalog, CatalogName, CatalogProvider, SecurityManagement};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Catalog registry backed by a map, counting every lookup
#[derive(Default)]
pub struct MockCatalogProvider {
    catalogs: RwLock<HashMap<String, Arc<Catalog>>>,
    resolve_calls: AtomicUsize,
}

impl MockCatalogProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connector` as catalog `name`
    ///
    /// The information-schema and system-tables targets get their own
    /// internal mock connectors sharing `connector`'s event log.
    pub fn add_catalog(&self, name: &str, connector: Arc<MockConnector>) -> Arc<Catalog> {
        let catalog_name = CatalogName::new(name);
        let information_schema = MockConnector::new(catalog_name.information_schema_id().as_str())
            .with_events(connector.events().clone())
            .internal();
        let system_tables = MockConnector::new(catalog_name.system_tables_id().as_str())
            .with_events(connector.events().clone())
            .internal();

        self.add_catalog_with(
            name,
            connector,
            Arc::new(information_schema),
            Arc::new(system_tables),
            SecurityManagement::Connector,
        )
    }

    /// Register a catalog with explicit internal connectors
    pub fn add_catalog_with(
        &self,
        name: &str,
        connector: Arc<MockConnector>,
        information_schema: Arc<MockConnector>,
        system_tables: Arc<MockConnector>,
        security_management: SecurityManagement,
    ) -> Arc<Catalog> {
        let catalog = Arc::new(Catalog::new(
            name,
            CatalogName::new(name),
            connector,
            information_schema,
            system_tables,
            security_management,
        ));
        self.catalogs
            .write()
            .insert(name.to_string(), catalog.clone());
        catalog
    }

    /// Number of `resolve` calls served so far
    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

impl CatalogProvider for MockCatalogProvider {
    fn resolve(&self, name: &str) -> Option<Arc<Catalog>> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.catalogs.read().get(name).cloned()
    }

    fn catalogs(&self) -> Vec<Arc<Catalog>> {
        let mut catalogs: Vec<_> = self.catalogs.read().values().cloned().collect();
        catalogs.sort_by(|a, b| a.catalog_name().cmp(b.catalog_name()));
        catalogs
    }
}
