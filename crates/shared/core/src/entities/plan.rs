use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PositionDirection;

/// Unique identifier for a scaled-exit plan
pub type PlanId = Uuid;

/// One partial-exit level of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitTarget {
    /// Profit percent at which this target fires
    pub target_percent: Decimal,
    /// Share of the total quantity sold at this target
    pub quantity_percent: Decimal,
    pub triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub fill_price: Option<Decimal>,
    pub order_id: Option<Uuid>,
    /// Shadow TAKE_PROFIT rule mirroring this target
    pub rule_id: Option<Uuid>,
}

impl ExitTarget {
    pub fn new(target_percent: Decimal, quantity_percent: Decimal) -> Self {
        Self {
            target_percent,
            quantity_percent,
            triggered: false,
            triggered_at: None,
            fill_price: None,
            order_id: None,
            rule_id: None,
        }
    }
}

/// Trailing take-profit leg selling whatever the targets leave over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingLeg {
    /// Profit percent that arms the leg (latching)
    pub activation_percent: Decimal,
    /// Retrace from the high-water mark that fires the leg
    pub trail_percent: Decimal,
    pub high_water_mark: Option<Decimal>,
    pub activated: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub triggered: bool,
    pub order_id: Option<Uuid>,
}

impl TrailingLeg {
    pub fn new(activation_percent: Decimal, trail_percent: Decimal) -> Self {
        Self {
            activation_percent,
            trail_percent,
            high_water_mark: None,
            activated: false,
            activated_at: None,
            triggered: false,
            order_id: None,
        }
    }

    /// Price at which the armed leg fires
    pub fn stop_price(&self, direction: PositionDirection) -> Option<Decimal> {
        let hwm = self.high_water_mark?;
        let retrace = hwm * self.trail_percent / Decimal::ONE_HUNDRED;
        Some(direction.price_after_loss(hwm, retrace))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Completed,
    Cancelled,
}

/// Multi-target partial-exit plan for one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledExitPlan {
    pub id: PlanId,
    pub symbol: String,
    pub direction: PositionDirection,
    pub entry_price: Decimal,
    pub total_quantity: Decimal,
    /// Monotonically non-increasing; plan completes when it reaches zero
    pub remaining_quantity: Decimal,
    /// Strictly ascending by `target_percent`
    pub targets: Vec<ExitTarget>,
    pub trailing: Option<TrailingLeg>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScaledExitPlan {
    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Active
    }

    /// Shares sold when `target` fires: floor(total * quantity% / 100)
    pub fn target_quantity(&self, target: &ExitTarget) -> Decimal {
        (self.total_quantity * target.quantity_percent / Decimal::ONE_HUNDRED).floor()
    }

    /// Profit percent at `price` relative to entry, direction-aware
    pub fn profit_pct(&self, price: Decimal) -> Option<Decimal> {
        self.direction.signed_gain_pct(self.entry_price, price)
    }

    /// Sum of target quantity percents
    pub fn allocated_percent(&self) -> Decimal {
        self.targets.iter().map(|t| t.quantity_percent).sum()
    }
}

/// Kinds of entries in a plan's event history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanEventKind {
    Created,
    TargetTriggered { index: usize },
    TrailingActivated,
    HighWaterMark,
    TrailingTriggered,
    Completed,
    Cancelled,
    Updated,
}

/// One entry of a plan's event history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEvent {
    pub id: Uuid,
    pub plan_id: PlanId,
    pub kind: PlanEventKind,
    pub price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub order_id: Option<Uuid>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl PlanEvent {
    pub fn new(plan_id: PlanId, kind: PlanEventKind, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_id,
            kind,
            price: None,
            quantity: None,
            order_id: None,
            message: String::new(),
            at,
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}
