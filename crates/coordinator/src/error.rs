//! Error types for the coordinator

use federate_common::{CatalogName, ConnectorError, TransactionId};
use thiserror::Error;

/// Coordinator error types
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Unknown transaction ID: {0}. Possibly expired? Commands ignored until end of transaction block")]
    NotInTransaction(TransactionId),

    #[error("Current transaction is aborted, commands ignored until end of transaction block")]
    TransactionAlreadyAborted,

    #[error("Illegal transaction state: {0}")]
    IllegalCompletedState(String),

    #[error("Cannot execute write in a read-only transaction")]
    ReadOnlyViolation,

    #[error(
        "Multi-catalog writes not supported in a single transaction. Already wrote to catalog {written}"
    )]
    MultiCatalogWriteConflict { written: CatalogName },

    #[error("Catalog {0} only supports writes using autocommit")]
    AutocommitWriteConflict(CatalogName),

    #[error("Catalog does not exist: {0}")]
    CatalogNotFound(String),

    #[error("Connector error in catalog {catalog}: {source}")]
    Connector {
        catalog: CatalogName,
        #[source]
        source: ConnectorError,
    },

    #[error("Finish task failed: {0}")]
    Finisher(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CoordinatorError {
    /// Standard engine error code reported to clients
    pub fn error_code(&self) -> &'static str {
        match self {
            CoordinatorError::NotInTransaction(_) => "NOT_IN_TRANSACTION",
            CoordinatorError::TransactionAlreadyAborted => "TRANSACTION_ALREADY_ABORTED",
            CoordinatorError::ReadOnlyViolation => "READ_ONLY_VIOLATION",
            CoordinatorError::MultiCatalogWriteConflict { .. } => "MULTI_CATALOG_WRITE_CONFLICT",
            CoordinatorError::AutocommitWriteConflict(_) => "AUTOCOMMIT_WRITE_CONFLICT",
            CoordinatorError::CatalogNotFound(_) => "NOT_FOUND",
            CoordinatorError::Connector { .. } => "CONNECTOR_ERROR",
            CoordinatorError::IllegalCompletedState(_)
            | CoordinatorError::Finisher(_)
            | CoordinatorError::Config(_) => "GENERIC_INTERNAL_ERROR",
        }
    }

    pub(crate) fn connector(catalog: &CatalogName, source: ConnectorError) -> Self {
        CoordinatorError::Connector {
            catalog: catalog.clone(),
            source,
        }
    }
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = CoordinatorError::MultiCatalogWriteConflict {
            written: CatalogName::new("hive"),
        };
        assert_eq!(err.error_code(), "MULTI_CATALOG_WRITE_CONFLICT");
        assert!(err.to_string().ends_with("Already wrote to catalog hive"));

        let err = CoordinatorError::IllegalCompletedState("already committed".into());
        assert_eq!(err.error_code(), "GENERIC_INTERNAL_ERROR");
    }

    #[test]
    fn test_connector_error_keeps_source() {
        let err = CoordinatorError::connector(
            &CatalogName::new("mysql"),
            ConnectorError::Backend("disk full".into()),
        );
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Backend error: disk full");
    }
}
