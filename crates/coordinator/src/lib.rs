//! Transaction coordinator for a federated query engine
//!
//! Opens, tracks and closes logical transactions that span independent
//! backend catalogs. At most one catalog may be written per transaction;
//! on commit it is finished first, then the read-only catalogs. Aborts
//! fan out to every backend and never fail the caller.

mod catalog_metadata;
mod config;
mod connector_transaction;
mod error;
mod finisher;
mod info;
mod manager;
mod transaction;

pub use catalog_metadata::CatalogMetadata;
pub use config::TransactionManagerConfig;
pub use connector_transaction::ConnectorTransaction;
pub use error::{CoordinatorError, Result};
pub use finisher::{BoundedFinisher, CompletionHandle};
pub use info::TransactionInfo;
pub use manager::{DEFAULT_ISOLATION, DEFAULT_READ_ONLY, TransactionManager};
pub use transaction::{CompletionStatus, TransactionRecord};
