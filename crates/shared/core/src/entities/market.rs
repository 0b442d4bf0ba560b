use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;

/// Direction of an open position
///
/// Gain/loss math lives here once so rules and plans never infer direction
/// from ad-hoc side comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionDirection {
    /// Bought the asset, profit when price rises
    Long,
    /// Sold borrowed asset, profit when price falls
    Short,
}

impl PositionDirection {
    /// Direction of a signed position quantity (zero counts as long)
    pub fn from_quantity(quantity: Decimal) -> Self {
        if quantity < Decimal::ZERO {
            PositionDirection::Short
        } else {
            PositionDirection::Long
        }
    }

    /// Side of the order that closes this position
    pub fn closing_side(&self) -> Side {
        match self {
            PositionDirection::Long => Side::Sell,
            PositionDirection::Short => Side::Buy,
        }
    }

    /// Side of the order that opens this position
    pub fn opening_side(&self) -> Side {
        self.closing_side().opposite()
    }

    /// Per-share gain of moving from `reference` to `price` (negative = loss)
    pub fn signed_gain(&self, reference: Decimal, price: Decimal) -> Decimal {
        match self {
            PositionDirection::Long => price - reference,
            PositionDirection::Short => reference - price,
        }
    }

    /// Gain in percent of `reference` (negative = loss)
    ///
    /// Returns `None` for a non-positive reference.
    pub fn signed_gain_pct(&self, reference: Decimal, price: Decimal) -> Option<Decimal> {
        if reference <= Decimal::ZERO {
            return None;
        }
        Some(self.signed_gain(reference, price) / reference * Decimal::ONE_HUNDRED)
    }

    /// Price reached after a favourable move of `amount` from `reference`
    pub fn price_after_gain(&self, reference: Decimal, amount: Decimal) -> Decimal {
        match self {
            PositionDirection::Long => reference + amount,
            PositionDirection::Short => reference - amount,
        }
    }

    /// Price reached after an adverse move of `amount` from `reference`
    pub fn price_after_loss(&self, reference: Decimal, amount: Decimal) -> Decimal {
        match self {
            PositionDirection::Long => reference - amount,
            PositionDirection::Short => reference + amount,
        }
    }

    /// True if `candidate` is a better (more profitable) price than `current`
    pub fn is_favourable(&self, candidate: Decimal, current: Decimal) -> bool {
        match self {
            PositionDirection::Long => candidate > current,
            PositionDirection::Short => candidate < current,
        }
    }
}

/// Latest quote for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, bid: Decimal, ask: Decimal, last: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            bid,
            ask,
            last,
            timestamp: Utc::now(),
        }
    }

    /// Mid price between bid and ask
    pub fn mid(&self) -> Option<Decimal> {
        if self.bid > Decimal::ZERO && self.ask > Decimal::ZERO {
            Some((self.bid + self.ask) / Decimal::TWO)
        } else {
            None
        }
    }

    /// Price used for trigger evaluation: last trade, falling back to mid
    pub fn reference_price(&self) -> Option<Decimal> {
        if self.last > Decimal::ZERO {
            Some(self.last)
        } else {
            self.mid()
        }
    }
}

/// Open position as reported by the brokerage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    /// Signed quantity (positive=long, negative=short)
    pub qty: Decimal,
    pub avg_entry_price: Decimal,
    pub current_price: Decimal,
    /// Unrealized P&L if the brokerage reports it
    pub unrealized_pl: Option<Decimal>,
}

impl BrokerPosition {
    pub fn new(
        symbol: impl Into<String>,
        qty: Decimal,
        avg_entry_price: Decimal,
        current_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            qty,
            avg_entry_price,
            current_price,
            unrealized_pl: None,
        }
    }

    pub fn direction(&self) -> PositionDirection {
        PositionDirection::from_quantity(self.qty)
    }

    /// Unrealized P&L, computed from prices when the brokerage omits it
    pub fn unrealized_pnl(&self) -> Decimal {
        self.unrealized_pl
            .unwrap_or_else(|| (self.current_price - self.avg_entry_price) * self.qty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_gain_is_inverted_for_shorts() {
        assert_eq!(
            PositionDirection::Long.signed_gain(dec!(100), dec!(110)),
            dec!(10)
        );
        assert_eq!(
            PositionDirection::Short.signed_gain(dec!(100), dec!(110)),
            dec!(-10)
        );
        assert_eq!(
            PositionDirection::Short.signed_gain_pct(dec!(100), dec!(95)),
            Some(dec!(5))
        );
        assert_eq!(PositionDirection::Long.signed_gain_pct(dec!(0), dec!(95)), None);
    }

    #[test]
    fn test_position_direction_from_quantity() {
        let short = BrokerPosition::new("AAPL", dec!(-10), dec!(150), dec!(140));
        assert_eq!(short.direction(), PositionDirection::Short);
        assert_eq!(short.direction().closing_side(), Side::Buy);
        assert_eq!(short.unrealized_pnl(), dec!(100));
    }

    #[test]
    fn test_quote_reference_price_falls_back_to_mid() {
        let quote = Quote::new("AAPL", dec!(99), dec!(101), dec!(0));
        assert_eq!(quote.reference_price(), Some(dec!(100)));
    }
}
