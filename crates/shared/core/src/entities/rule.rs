use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{OrderType, PositionDirection, Side, TimeInForce};

/// Unique identifier for an automation rule
pub type RuleId = Uuid;

/// Shared identifier of the legs of a one-cancels-other group
pub type OcoGroupId = Uuid;

/// What kind of automation a rule implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    LimitOrder,
    StopLoss,
    TakeProfit,
    Oco,
    TrailingStop,
}

impl RuleType {
    /// Rules that only ever reduce an existing position
    pub fn is_exit(&self) -> bool {
        !matches!(self, RuleType::LimitOrder)
    }
}

/// Condition under which a rule fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    PriceAbove,
    PriceBelow,
    PercentGain,
    PercentLoss,
    DollarGain,
    DollarLoss,
}

impl TriggerType {
    /// Triggers measured relative to an entry price
    pub fn needs_entry_price(&self) -> bool {
        !matches!(self, TriggerType::PriceAbove | TriggerType::PriceBelow)
    }

    pub fn is_loss(&self) -> bool {
        matches!(self, TriggerType::PercentLoss | TriggerType::DollarLoss)
    }

    pub fn is_percent(&self) -> bool {
        matches!(self, TriggerType::PercentGain | TriggerType::PercentLoss)
    }
}

/// Rule lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Active,
    Triggered,
    Cancelled,
    Expired,
}

impl RuleStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RuleStatus::Active)
    }
}

/// A conditional order waiting for its trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub symbol: String,
    /// Free-form label shown in listings
    pub name: String,
    pub rule_type: RuleType,
    pub trigger_type: TriggerType,
    pub trigger_value: Decimal,
    /// Side of the order placed on fire (the closing side for exits)
    pub order_side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    /// Co-members cancel each other on fire
    pub oco_group_id: Option<OcoGroupId>,
    /// Reference for percent/dollar triggers; falls back to the live position
    pub entry_price: Option<Decimal>,
    /// Best price seen since creation (trailing stops only)
    pub high_water_mark: Option<Decimal>,
    /// Set when the rule is a shadow of a scaled-exit target
    pub plan_id: Option<Uuid>,
    pub status: RuleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AutomationRule {
    /// Direction of the position this rule manages
    pub fn direction(&self) -> PositionDirection {
        self.order_side.closes()
    }

    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }

    /// Shadow rules are driven by their scaled-exit plan, never fired directly
    pub fn is_plan_owned(&self) -> bool {
        self.plan_id.is_some()
    }

    /// Move to a new status, stamping timestamps
    pub fn transition(&mut self, status: RuleStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
        if status == RuleStatus::Triggered {
            self.triggered_at = Some(now);
        }
    }
}

/// One row of the append-only execution history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub rule_id: RuleId,
    pub symbol: String,
    pub side: Side,
    /// Market price observed when the rule fired
    pub trigger_price: Decimal,
    pub quantity: Decimal,
    /// Queue entry created for the fire
    pub order_id: Option<Uuid>,
    /// Broker order ID, back-filled once the queue submits the order
    pub broker_order_id: Option<String>,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}
