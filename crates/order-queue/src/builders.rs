//! Convenience submitters over [`OrderQueue::enqueue`]

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vigil_core::{OrderId, OrderRequest, QueuedOrder, Side};

use crate::error::{Error, Result};
use crate::queue::{NewOrder, OrderQueue};

/// Metadata key holding [`BracketLegs`] on a bracket entry order
pub const BRACKET_KEY: &str = "bracket";

/// An entry order with protective exit legs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketOrder {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    /// Limit entry price; market entry when absent
    pub entry_limit_price: Option<Decimal>,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
}

/// Exit legs recorded on a bracket entry, spawned once its fill is seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketLegs {
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    #[serde(default)]
    pub spawned: bool,
    /// Why the legs could not be spawned; set at most once
    #[serde(default)]
    pub failed: Option<String>,
}

impl BracketLegs {
    pub fn from_order(order: &QueuedOrder) -> Option<Self> {
        order
            .metadata
            .get(BRACKET_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Closed entry with filled shares whose legs are still outstanding
    ///
    /// A partially filled entry that was then cancelled qualifies for the
    /// shares it did get.
    pub fn awaiting_spawn(order: &QueuedOrder) -> bool {
        order.status.is_terminal()
            && order.filled_qty > Decimal::ZERO
            && Self::from_order(order).is_some_and(|legs| !legs.spawned && legs.failed.is_none())
    }

    /// True if `price` lies strictly between the legs on the side an entry
    /// of `side` needs
    pub fn brackets(&self, side: Side, price: Decimal) -> bool {
        match side {
            Side::Buy => self.stop_loss_price < price && price < self.take_profit_price,
            Side::Sell => self.take_profit_price < price && price < self.stop_loss_price,
        }
    }

    fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::Validation(e.to_string()))
    }
}

impl BracketOrder {
    fn validate(&self) -> Result<()> {
        let (below, above) = match self.side {
            Side::Buy => (self.stop_loss_price, self.take_profit_price),
            Side::Sell => (self.take_profit_price, self.stop_loss_price),
        };
        if self.stop_loss_price <= Decimal::ZERO || self.take_profit_price <= Decimal::ZERO {
            return Err(Error::Validation("bracket prices must be positive".to_string()));
        }
        if below >= above {
            return Err(Error::Validation(format!(
                "{} bracket needs stop loss {} on the far side of take profit {}",
                self.side.as_str(),
                self.stop_loss_price,
                self.take_profit_price
            )));
        }
        if let Some(entry) = self.entry_limit_price
            && !(below < entry && entry < above)
        {
            return Err(Error::Validation(format!(
                "entry {entry} must lie between {below} and {above}"
            )));
        }
        Ok(())
    }
}

impl OrderQueue {
    pub async fn submit_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<QueuedOrder> {
        self.enqueue(NewOrder::new(OrderRequest::market(symbol, side, quantity)))
            .await
    }

    pub async fn submit_limit_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Result<QueuedOrder> {
        self.enqueue(NewOrder::new(OrderRequest::limit(
            symbol,
            side,
            quantity,
            limit_price,
        )))
        .await
    }

    /// Stop-market order, queued ahead of ordinary entries
    pub async fn submit_stop_loss(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Result<QueuedOrder> {
        self.enqueue(
            NewOrder::new(OrderRequest::stop(symbol, side, quantity, stop_price))
                .with_priority(self.config.exit_order_priority),
        )
        .await
    }

    /// Queue the entry only; its legs are spawned after the fill
    pub async fn submit_bracket_order(&self, bracket: BracketOrder) -> Result<QueuedOrder> {
        bracket.validate()?;
        let request = match bracket.entry_limit_price {
            Some(price) => OrderRequest::limit(&bracket.symbol, bracket.side, bracket.quantity, price),
            None => OrderRequest::market(&bracket.symbol, bracket.side, bracket.quantity),
        };
        let legs = BracketLegs {
            stop_loss_price: bracket.stop_loss_price,
            take_profit_price: bracket.take_profit_price,
            spawned: false,
            failed: None,
        };
        self.enqueue(NewOrder::new(request).with_metadata(BRACKET_KEY, legs.to_value()?))
            .await
    }

    /// Closed bracket entries still waiting for their legs
    pub async fn brackets_awaiting_spawn(&self) -> Vec<QueuedOrder> {
        self.list(None)
            .await
            .into_iter()
            .filter(BracketLegs::awaiting_spawn)
            .collect()
    }

    pub async fn mark_bracket_spawned(&self, id: OrderId) -> Result<QueuedOrder> {
        let order = self.get(id).await?.ok_or(Error::OrderNotFound(id))?;
        let mut legs = BracketLegs::from_order(&order)
            .ok_or_else(|| Error::Validation(format!("order {id} is not a bracket entry")))?;
        legs.spawned = true;
        self.set_metadata(id, BRACKET_KEY, legs.to_value()?).await
    }

    /// Give up on an entry's legs; it is never offered for spawning again
    pub async fn mark_bracket_failed(&self, id: OrderId, reason: &str) -> Result<QueuedOrder> {
        let order = self.get(id).await?.ok_or(Error::OrderNotFound(id))?;
        let mut legs = BracketLegs::from_order(&order)
            .ok_or_else(|| Error::Validation(format!("order {id} is not a bracket entry")))?;
        legs.failed = Some(reason.to_string());
        self.set_metadata(id, BRACKET_KEY, legs.to_value()?).await
    }
}
