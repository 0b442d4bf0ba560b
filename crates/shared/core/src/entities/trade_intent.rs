use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{OrderRequest, OrderType, Side, TimeInForce};

/// What produced a trade intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentSource {
    /// An automation rule fired
    Rule { rule_id: Uuid },
    /// A scaled-exit target or trailing leg fired
    ScaledExit { plan_id: Uuid, leg: String },
    /// Submitted through the order API
    Manual,
}

/// A request to trade, before the risk gate has approved it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub source: IntentSource,
    /// True for position-reducing exits: no regime gating or resizing
    pub reduces_position: bool,
    pub skip_regime_check: bool,
    /// Human readable reason, carried into order metadata
    pub reason: String,
}

impl TradeIntent {
    /// Build an intent from an order payload
    pub fn from_request(request: &OrderRequest, source: IntentSource) -> Self {
        Self {
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            time_in_force: request.time_in_force,
            source,
            reduces_position: false,
            skip_regime_check: false,
            reason: String::new(),
        }
    }

    /// A market exit closing (part of) a position
    pub fn market_exit(
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        source: IntentSource,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
            source,
            reduces_position: true,
            skip_regime_check: true,
            reason: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Order payload for this intent (client order ID assigned by the queue)
    pub fn to_request(&self) -> OrderRequest {
        OrderRequest {
            client_order_id: String::new(),
            symbol: self.symbol.clone(),
            side: self.side,
            order_type: self.order_type,
            quantity: self.quantity,
            limit_price: self.limit_price,
            stop_price: self.stop_price,
            time_in_force: self.time_in_force,
        }
    }
}
