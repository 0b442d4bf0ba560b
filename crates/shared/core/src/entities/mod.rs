mod market;
mod order_request;
mod order_type;
mod plan;
mod queued_order;
mod regime;
mod risk_config;
mod rule;
mod side;
mod time_in_force;
mod trade_intent;

pub use market::{BrokerPosition, PositionDirection, Quote};
pub use order_request::{BrokerOrder, BrokerOrderStatus, OrderRequest};
pub use order_type::OrderType;
pub use plan::{ExitTarget, PlanEvent, PlanEventKind, PlanId, PlanStatus, ScaledExitPlan, TrailingLeg};
pub use queued_order::{OrderId, QueuedOrder, QueuedOrderStatus};
pub use regime::{Regime, RegimeReading};
pub use risk_config::{ClosedTrade, RiskConfig, RiskConfigUpdate};
pub use rule::{
    AutomationRule, ExecutionRecord, OcoGroupId, RuleId, RuleStatus, RuleType, TriggerType,
};
pub use side::Side;
pub use time_in_force::TimeInForce;
pub use trade_intent::{IntentSource, TradeIntent};
