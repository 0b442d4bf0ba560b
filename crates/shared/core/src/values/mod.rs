use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Price value - uses Decimal for precision
pub type Price = Decimal;

/// Quantity value - uses Decimal for precision (whole shares in practice)
pub type Quantity = Decimal;

/// Percentage value expressed in percent units (5 means 5%)
pub type Percent = Decimal;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Ticker symbol of a tradeable equity
pub type Symbol = String;
