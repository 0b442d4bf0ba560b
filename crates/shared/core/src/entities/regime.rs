use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Market regime classification supplied by the external classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    /// Strong directional trend, full size
    Trend,
    /// Range-bound, reduced size
    Chop,
    /// Volatility expanding, half size
    VolExpansion,
    /// No new exposure
    Untradeable,
}

impl Regime {
    /// Advisory size multiplier callers should apply
    pub fn size_multiplier(&self) -> Decimal {
        match self {
            Regime::Trend => Decimal::ONE,
            Regime::Chop => dec!(0.7),
            Regime::VolExpansion => dec!(0.5),
            Regime::Untradeable => Decimal::ZERO,
        }
    }

    pub fn blocks_trading(&self) -> bool {
        matches!(self, Regime::Untradeable)
    }
}

/// A regime classification with its confidence (0.0 - 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeReading {
    pub regime: Regime,
    pub confidence: Decimal,
}
