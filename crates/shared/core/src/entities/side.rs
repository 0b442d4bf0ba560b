use serde::{Deserialize, Serialize};

use super::PositionDirection;

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Direction of the position this side closes
    ///
    /// Selling closes a long, buying closes (covers) a short.
    pub fn closes(&self) -> PositionDirection {
        match self {
            Side::Sell => PositionDirection::Long,
            Side::Buy => PositionDirection::Short,
        }
    }

    /// Signed multiplier applied to a quantity (+1 buy, -1 sell)
    pub fn sign(&self) -> rust_decimal::Decimal {
        match self {
            Side::Buy => rust_decimal::Decimal::ONE,
            Side::Sell => rust_decimal::Decimal::NEGATIVE_ONE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}
