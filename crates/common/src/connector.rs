//! Backend connector abstractions
//!
//! A connector is one independently transactable data source. The
//! coordinator only ever talks to it through this trait: begin a
//! transaction, read its metadata view, then commit or roll back.
//! Calls may block on backend I/O.

use crate::{IsolationLevel, TransactionId};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a backend connector
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Transaction handle not recognized by connector")]
    UnknownHandle,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Result type for connector calls
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Optional features a connector advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorCapability {
    /// Connector enforces `NOT NULL` column constraints itself
    NotNullColumnConstraint,
}

/// Opaque per-transaction handle issued by a connector
///
/// Only the issuing connector knows the concrete type; it downcasts the
/// handle back when it is passed to `commit`/`rollback`/`metadata`.
#[derive(Clone)]
pub struct ConnectorTransactionHandle(Arc<dyn Any + Send + Sync>);

impl ConnectorTransactionHandle {
    pub fn new<T: Any + Send + Sync>(handle: T) -> Self {
        Self(Arc::new(handle))
    }

    /// Recover the connector-specific handle
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// True if both values refer to the same issued handle
    pub fn same_handle(&self, other: &ConnectorTransactionHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ConnectorTransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectorTransactionHandle")
            .field(&Arc::as_ptr(&self.0))
            .finish()
    }
}

/// A connector's catalog view, scoped to one connector transaction
pub trait ConnectorMetadata: Send + Sync {
    /// Schemas visible to the transaction
    fn list_schema_names(&self) -> Vec<String>;
}

/// Backend-specific implementation behind a catalog
pub trait Connector: Send + Sync {
    /// Open a backend transaction
    fn begin_transaction(
        &self,
        isolation: IsolationLevel,
        read_only: bool,
    ) -> Result<ConnectorTransactionHandle>;

    /// Open a backend transaction bound to an engine transaction id.
    ///
    /// Internal connectors (information schema, system tables) override
    /// this to look the engine transaction back up; everyone else ignores
    /// the id.
    fn begin_transaction_for(
        &self,
        transaction_id: TransactionId,
        isolation: IsolationLevel,
        read_only: bool,
    ) -> Result<ConnectorTransactionHandle> {
        let _ = transaction_id;
        self.begin_transaction(isolation, read_only)
    }

    /// Metadata view for an open transaction
    fn metadata(&self, handle: &ConnectorTransactionHandle) -> Result<Arc<dyn ConnectorMetadata>>;

    fn commit(&self, handle: &ConnectorTransactionHandle) -> Result<()>;

    fn rollback(&self, handle: &ConnectorTransactionHandle) -> Result<()>;

    /// Backends that can only write from an implicit single-statement transaction
    fn is_single_statement_writes_only(&self) -> bool {
        false
    }

    fn capabilities(&self) -> HashSet<ConnectorCapability> {
        HashSet::new()
    }
}
