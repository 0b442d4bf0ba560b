//! Engine configuration
//!
//! Loaded from JSON; every section and field falls back to its default.

use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use vigil_core::RiskConfig;
use vigil_order_queue::QueueConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub monitor: MonitorSettings,
    pub broker: BrokerSettings,
    pub queue: QueueConfig,
    /// Seed for an empty risk config store
    pub risk: RiskLimits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub tick_interval_ms: u64,
    /// Scheduled ticks are skipped outside these hours
    pub market_hours: Option<MarketHours>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10_000,
            market_hours: None,
        }
    }
}

/// Trading session in local time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
    #[serde(default = "weekdays")]
    pub days: Vec<Weekday>,
}

fn weekdays() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ]
}

impl MarketHours {
    /// True if `at` (local wall time) falls inside the session
    pub fn is_open(&self, at: NaiveDateTime) -> bool {
        let time = at.time();
        self.days.contains(&at.weekday()) && time >= self.open && time < self.close
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Bound on every brokerage call
    pub timeout_ms: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    pub max_position_size: Decimal,
    pub max_order_size: Decimal,
    pub max_daily_loss: Decimal,
    pub allowed_symbols: Vec<String>,
    pub trading_enabled: bool,
}

impl Default for RiskLimits {
    fn default() -> Self {
        let config = RiskConfig::default();
        Self {
            max_position_size: config.max_position_size,
            max_order_size: config.max_order_size,
            max_daily_loss: config.max_daily_loss,
            allowed_symbols: config.allowed_symbols,
            trading_enabled: config.trading_enabled,
        }
    }
}

impl RiskLimits {
    pub fn to_risk_config(&self, now: DateTime<Utc>) -> RiskConfig {
        RiskConfig {
            max_position_size: self.max_position_size,
            max_order_size: self.max_order_size,
            max_daily_loss: self.max_daily_loss,
            allowed_symbols: self.allowed_symbols.iter().map(|s| s.to_uppercase()).collect(),
            trading_enabled: self.trading_enabled,
            kill_switch_reason: None,
            version: 0,
            updated_at: now,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("monitor.tick_interval_ms must be positive".into()));
        }
        if self.broker.timeout_ms == 0 {
            return Err(ConfigError::Invalid("broker.timeout_ms must be positive".into()));
        }
        if let Some(hours) = &self.monitor.market_hours
            && hours.open >= hours.close
        {
            return Err(ConfigError::Invalid(format!(
                "market hours open {} must precede close {}",
                hours.open, hours.close
            )));
        }
        let limits = [
            ("risk.max_position_size", self.risk.max_position_size),
            ("risk.max_order_size", self.risk.max_order_size),
            ("risk.max_daily_loss", self.risk.max_daily_loss),
        ];
        for (name, value) in limits {
            if value <= Decimal::ZERO {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    /// Broker timeout as a tokio duration
    pub fn broker_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.broker.timeout_ms)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.monitor.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sections_default_independently() {
        let config = EngineConfig::from_json(
            r#"{
                "monitor": { "tick_interval_ms": 2000 },
                "risk": { "max_order_size": "50", "allowed_symbols": ["aapl"] }
            }"#,
        )
        .unwrap();

        assert_eq!(config.monitor.tick_interval_ms, 2000);
        assert_eq!(config.broker.timeout_ms, 5000);
        assert_eq!(config.queue.default_max_retries, 3);
        assert_eq!(config.risk.max_order_size, dec!(50));
        assert_eq!(config.risk.max_daily_loss, dec!(5000));
        assert_eq!(
            config.risk.to_risk_config(Utc::now()).allowed_symbols,
            vec!["AAPL".to_string()]
        );
    }

    #[test]
    fn test_rejects_inverted_market_hours() {
        let err = EngineConfig::from_json(
            r#"{ "monitor": { "market_hours": { "open": "16:00:00", "close": "09:30:00" } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_market_hours_window() {
        let hours = MarketHours {
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            days: weekdays(),
        };
        // 2024-01-08 is a Monday
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        assert!(hours.is_open(monday.and_hms_opt(10, 0, 0).unwrap()));
        assert!(!hours.is_open(monday.and_hms_opt(16, 0, 0).unwrap()));
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 13).unwrap();
        assert!(!hours.is_open(saturday.and_hms_opt(10, 0, 0).unwrap()));
    }
}
