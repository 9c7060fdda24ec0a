//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BatchError, Result};

/// Configuration for a [`BatchScheduler`](crate::BatchScheduler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Dispatch as soon as this many requests are pending
    pub max_batch_size: usize,
    /// Dispatch once the oldest pending request has waited this long (ms)
    pub max_wait_ms: u64,
    /// Pending requests allowed before `submit` fails with `QueueSaturated`
    pub max_queue_depth: usize,
    /// How long a caller waits on its handle before giving up (ms)
    pub result_timeout_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 8,
            max_wait_ms: 10,
            max_queue_depth: 256,
            result_timeout_ms: 5_000,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(BatchError::InvalidConfig(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_queue_depth == 0 {
            return Err(BatchError::InvalidConfig(
                "max_queue_depth must be at least 1".to_string(),
            ));
        }
        if self.result_timeout_ms == 0 {
            return Err(BatchError::InvalidConfig(
                "result_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(BatchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let config = BatchConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BatchConfig {
            max_queue_depth: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BatchConfig {
            result_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BatchConfig = serde_json::from_str(r#"{"max_batch_size": 32}"#).unwrap();
        assert_eq!(config.max_batch_size, 32);
        assert_eq!(config.max_queue_depth, 256);
    }
}
