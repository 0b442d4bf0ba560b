use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderType, Side, TimeInForce};

/// Order payload sent to the brokerage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-assigned order ID for correlation and idempotent resubmission
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Required for Limit and StopLimit orders
    pub limit_price: Option<Decimal>,
    /// Required for Stop and StopLimit orders
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    /// Create a market order request
    pub fn market(symbol: impl Into<String>, side: Side, quantity: Decimal) -> Self {
        Self {
            client_order_id: String::new(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
        }
    }

    /// Create a limit order request
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(price),
            time_in_force: TimeInForce::Gtc,
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Create a stop (stop-market) order request
    pub fn stop(symbol: impl Into<String>, side: Side, quantity: Decimal, stop: Decimal) -> Self {
        Self {
            order_type: OrderType::Stop,
            stop_price: Some(stop),
            time_in_force: TimeInForce::Gtc,
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    /// Describe why this request is malformed, if it is
    pub fn validation_error(&self) -> Option<String> {
        if self.symbol.trim().is_empty() {
            return Some("symbol is required".to_string());
        }
        if self.quantity <= Decimal::ZERO {
            return Some(format!("quantity must be positive, got {}", self.quantity));
        }
        if self.order_type.requires_limit_price() && self.limit_price.is_none() {
            return Some(format!("{:?} order requires a limit price", self.order_type));
        }
        if self.order_type.requires_stop_price() && self.stop_price.is_none() {
            return Some(format!("{:?} order requires a stop price", self.order_type));
        }
        if let Some(price) = self.limit_price
            && price <= Decimal::ZERO
        {
            return Some(format!("limit price must be positive, got {price}"));
        }
        if let Some(price) = self.stop_price
            && price <= Decimal::ZERO
        {
            return Some(format!("stop price must be positive, got {price}"));
        }
        None
    }
}

/// Order status as reported by the brokerage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerOrderStatus {
    /// Accepted, working, no fills yet
    Accepted,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
    Rejected,
}

impl BrokerOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BrokerOrderStatus::Filled
                | BrokerOrderStatus::Canceled
                | BrokerOrderStatus::Expired
                | BrokerOrderStatus::Rejected
        )
    }
}

/// Authoritative order record returned by the brokerage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrder {
    /// Broker-assigned order ID
    pub id: String,
    pub client_order_id: String,
    pub status: BrokerOrderStatus,
    pub filled_qty: Decimal,
    pub filled_avg_price: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_limit_order_requires_price() {
        let mut order = OrderRequest::limit("AAPL", Side::Buy, dec!(10), dec!(150));
        assert!(order.validation_error().is_none());

        order.limit_price = None;
        assert!(order.validation_error().is_some());
    }

    #[test]
    fn test_quantity_must_be_positive() {
        let order = OrderRequest::market("AAPL", Side::Sell, dec!(0));
        assert!(
            order
                .validation_error()
                .is_some_and(|e| e.contains("quantity"))
        );
    }
}
