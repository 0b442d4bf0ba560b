use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Risk limits enforced by the gatekeeper
///
/// A single current-version row. The kill switch is the negation of
/// `trading_enabled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Maximum absolute resulting position per symbol (shares)
    pub max_position_size: Decimal,
    /// Maximum quantity per order (shares)
    pub max_order_size: Decimal,
    /// Maximum loss per local trading day (account currency, positive)
    pub max_daily_loss: Decimal,
    /// Symbols allowed to trade; empty means unrestricted
    #[serde(default)]
    pub allowed_symbols: Vec<String>,
    /// Master switch (false = kill switch active)
    pub trading_enabled: bool,
    /// Why the kill switch was activated
    #[serde(default)]
    pub kill_switch_reason: Option<String>,
    /// Incremented on every write
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: dec!(1000),
            max_order_size: dec!(500),
            max_daily_loss: dec!(5000),
            allowed_symbols: Vec::new(),
            trading_enabled: true,
            kill_switch_reason: None,
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

impl RiskConfig {
    /// Check if a symbol is on the allow-list (empty list allows everything)
    pub fn is_symbol_allowed(&self, symbol: &str) -> bool {
        self.allowed_symbols.is_empty()
            || self
                .allowed_symbols
                .iter()
                .any(|s| s.eq_ignore_ascii_case(symbol))
    }

    pub fn kill_switch_active(&self) -> bool {
        !self.trading_enabled
    }

    /// Apply a partial update, bumping the version
    pub fn apply(&mut self, update: &RiskConfigUpdate, now: DateTime<Utc>) {
        if let Some(v) = update.max_position_size {
            self.max_position_size = v;
        }
        if let Some(v) = update.max_order_size {
            self.max_order_size = v;
        }
        if let Some(v) = update.max_daily_loss {
            self.max_daily_loss = v;
        }
        if let Some(v) = &update.allowed_symbols {
            self.allowed_symbols = v.iter().map(|s| s.to_uppercase()).collect();
        }
        if let Some(v) = update.trading_enabled {
            self.trading_enabled = v;
            if v {
                self.kill_switch_reason = None;
            }
        }
        self.version += 1;
        self.updated_at = now;
    }
}

/// Partial update of the risk configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskConfigUpdate {
    pub max_position_size: Option<Decimal>,
    pub max_order_size: Option<Decimal>,
    pub max_daily_loss: Option<Decimal>,
    pub allowed_symbols: Option<Vec<String>>,
    pub trading_enabled: Option<bool>,
}

/// A position closed at the brokerage, used for realized daily P&L
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub realized_pnl: Decimal,
    pub closed_at: DateTime<Utc>,
}
