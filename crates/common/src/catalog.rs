//! Catalogs and the registry that resolves them

use crate::connector::Connector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const INFORMATION_SCHEMA_PREFIX: &str = "$info_schema@";
const SYSTEM_TABLES_PREFIX: &str = "$system@";

/// Identity of one transactable catalog target
///
/// Every user-visible catalog `c` exposes three targets: `c` itself, its
/// information schema `$info_schema@c`, and its system tables `$system@c`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CatalogName(String);

impl CatalogName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn information_schema_id(&self) -> CatalogName {
        CatalogName(format!("{}{}", INFORMATION_SCHEMA_PREFIX, self.0))
    }

    pub fn system_tables_id(&self) -> CatalogName {
        CatalogName(format!("{}{}", SYSTEM_TABLES_PREFIX, self.0))
    }

    /// True for information-schema and system-tables targets
    pub fn is_internal(&self) -> bool {
        self.0.starts_with(INFORMATION_SCHEMA_PREFIX) || self.0.starts_with(SYSTEM_TABLES_PREFIX)
    }
}

impl fmt::Display for CatalogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CatalogName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Who enforces access control for a catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityManagement {
    /// The engine's system access control
    System,
    /// The connector's own access control
    Connector,
}

/// A named backend data source with its three transactable targets
pub struct Catalog {
    catalog_name: String,
    connector_catalog_name: CatalogName,
    connector: Arc<dyn Connector>,
    information_schema_id: CatalogName,
    information_schema: Arc<dyn Connector>,
    system_tables_id: CatalogName,
    system_tables: Arc<dyn Connector>,
    security_management: SecurityManagement,
}

impl Catalog {
    pub fn new(
        catalog_name: impl Into<String>,
        connector_catalog_name: CatalogName,
        connector: Arc<dyn Connector>,
        information_schema: Arc<dyn Connector>,
        system_tables: Arc<dyn Connector>,
        security_management: SecurityManagement,
    ) -> Self {
        Self {
            catalog_name: catalog_name.into(),
            information_schema_id: connector_catalog_name.information_schema_id(),
            system_tables_id: connector_catalog_name.system_tables_id(),
            connector_catalog_name,
            connector,
            information_schema,
            system_tables,
            security_management,
        }
    }

    /// User-visible catalog name
    pub fn catalog_name(&self) -> &str {
        &self.catalog_name
    }

    /// Identity of the primary data target
    pub fn connector_catalog_name(&self) -> &CatalogName {
        &self.connector_catalog_name
    }

    pub fn information_schema_id(&self) -> &CatalogName {
        &self.information_schema_id
    }

    pub fn system_tables_id(&self) -> &CatalogName {
        &self.system_tables_id
    }

    pub fn security_management(&self) -> SecurityManagement {
        self.security_management
    }

    /// All three target ids, primary first
    pub fn target_ids(&self) -> [&CatalogName; 3] {
        [
            &self.connector_catalog_name,
            &self.information_schema_id,
            &self.system_tables_id,
        ]
    }

    /// Connector serving `target`, if `target` belongs to this catalog
    pub fn connector(&self, target: &CatalogName) -> Option<&Arc<dyn Connector>> {
        if target == &self.connector_catalog_name {
            Some(&self.connector)
        } else if target == &self.information_schema_id {
            Some(&self.information_schema)
        } else if target == &self.system_tables_id {
            Some(&self.system_tables)
        } else {
            None
        }
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("catalog_name", &self.catalog_name)
            .field("connector_catalog_name", &self.connector_catalog_name)
            .field("security_management", &self.security_management)
            .finish_non_exhaustive()
    }
}

/// Registry resolving catalog names to catalogs
///
/// Read-only from the coordinator's point of view and shared by every
/// transaction.
pub trait CatalogProvider: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<Catalog>>;

    /// Every catalog currently registered
    fn catalogs(&self) -> Vec<Arc<Catalog>>;
}
