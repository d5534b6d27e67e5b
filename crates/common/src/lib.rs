//! Common types for the federated transaction coordinator
//!
//! This crate defines:
//! - Transaction IDs (UUIDv7-based) and isolation levels
//! - Catalog identities and the catalog registry interface
//! - The connector interface every backend implements

mod catalog;
mod connector;
mod isolation;
mod transaction_id;

pub use catalog::{Catalog, CatalogName, CatalogProvider, SecurityManagement};
pub use connector::{
    Connector, ConnectorCapability, ConnectorError, ConnectorMetadata, ConnectorTransactionHandle,
    Result as ConnectorResult,
};
pub use isolation::IsolationLevel;
pub use transaction_id::TransactionId;
