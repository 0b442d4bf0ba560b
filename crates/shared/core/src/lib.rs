//! Vigil Core Domain
//!
//! Pure domain types for the Vigil conditional order automation system.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    AutomationRule, BrokerOrder, BrokerOrderStatus, BrokerPosition, ClosedTrade,
    ExecutionRecord, ExitTarget, IntentSource, OcoGroupId, OrderId, OrderRequest, OrderType,
    PlanEvent, PlanEventKind, PlanId, PlanStatus, PositionDirection, QueuedOrder,
    QueuedOrderStatus, Quote, Regime, RegimeReading, RiskConfig, RiskConfigUpdate, RuleId,
    RuleStatus, RuleType, ScaledExitPlan, Side, TimeInForce, TradeIntent, TrailingLeg,
    TriggerType,
};
pub use values::{Percent, Price, Quantity, Symbol, Timestamp};
