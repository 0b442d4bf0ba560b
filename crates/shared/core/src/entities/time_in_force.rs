use serde::{Deserialize, Serialize};

/// Time-in-force instructions for order validity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    /// Day order: automatically canceled at end of trading day
    #[default]
    Day,

    /// Good Till Canceled: order remains active until explicitly canceled
    Gtc,

    /// Immediate or Cancel: execute immediately (partially or fully) and cancel unfilled portion
    Ioc,

    /// Fill or Kill: execute immediately and completely, or cancel entire order
    Fok,
}

impl TimeInForce {
    /// Returns true if partial fills are allowed
    pub fn allows_partial_fill(&self) -> bool {
        !matches!(self, TimeInForce::Fok)
    }
}
