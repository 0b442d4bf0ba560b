//! Queue configuration

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Retry and priority defaults for queued orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Retry budget for orders enqueued without one
    pub default_max_retries: u32,
    pub default_priority: i32,
    /// Backoff after the first transient failure; doubles per retry
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Priority of orders fired by automation rules
    pub rule_order_priority: i32,
    /// Priority of scaled-exit orders
    pub exit_order_priority: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            default_priority: 0,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            rule_order_priority: 10,
            exit_order_priority: 20,
        }
    }
}

impl QueueConfig {
    /// Delay before the next attempt after `retry_count` transient failures
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = 1u64
            .checked_shl(retry_count.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let ms = self
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.backoff_max_ms);
        Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = QueueConfig::default();
        assert_eq!(config.backoff(1), Duration::seconds(1));
        assert_eq!(config.backoff(2), Duration::seconds(2));
        assert_eq!(config.backoff(3), Duration::seconds(4));
        assert_eq!(config.backoff(10), Duration::seconds(60));
        assert_eq!(config.backoff(200), Duration::seconds(60));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: QueueConfig = serde_json::from_str(r#"{"default_max_retries": 5}"#).unwrap();
        assert_eq!(config.default_max_retries, 5);
        assert_eq!(config.backoff_base_ms, 1_000);
    }
}
