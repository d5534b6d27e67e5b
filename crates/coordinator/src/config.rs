//! Transaction manager configuration

use crate::error::{CoordinatorError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the transaction table and its finishers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionManagerConfig {
    /// Inactive transactions idle for longer than this are aborted
    #[serde(rename = "idle_timeout_ms", with = "millis")]
    pub idle_timeout: Duration,

    /// Delay between idle sweeps
    #[serde(rename = "idle_check_interval_ms", with = "millis")]
    pub idle_check_interval: Duration,

    /// Backend commit/abort calls one transaction may have in flight
    pub max_finishing_concurrency: usize,
}

impl Default for TransactionManagerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(5 * 60),
            idle_check_interval: Duration::from_secs(1),
            max_finishing_concurrency: 1,
        }
    }
}

impl TransactionManagerConfig {
    /// Settings for tests: nothing expires in practice
    pub fn for_testing() -> Self {
        Self {
            idle_timeout: Duration::from_secs(24 * 60 * 60),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_finishing_concurrency == 0 {
            return Err(CoordinatorError::Config(
                "max_finishing_concurrency must be at least 1".to_string(),
            ));
        }
        if self.idle_check_interval.is_zero() {
            return Err(CoordinatorError::Config(
                "idle_check_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
