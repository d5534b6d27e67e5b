//! Point-in-time description of a live transaction

use chrono::{DateTime, Utc};
use federate_common::{CatalogName, IsolationLevel, TransactionId};
use serde::Serialize;
use std::time::Duration;

/// Snapshot returned by `get_info`, suitable for a system table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionInfo {
    pub transaction_id: TransactionId,
    pub isolation_level: IsolationLevel,
    pub read_only: bool,
    pub autocommit_context: bool,
    pub create_time: DateTime<Utc>,
    /// Zero while a statement is executing
    pub idle_time: Duration,
    /// Every target a connector transaction was opened for, sorted
    pub catalog_names: Vec<CatalogName>,
    pub written_catalog: Option<CatalogName>,
}
