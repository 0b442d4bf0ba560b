use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use vigil_core::{
    AutomationRule, ClosedTrade, ExecutionRecord, OcoGroupId, OrderId, PlanEvent, PlanId,
    PlanStatus, QueuedOrder, QueuedOrderStatus, RiskConfig, RuleId, RuleStatus, ScaledExitPlan,
};

use crate::error::StoreResult;

/// Repository for automation rules
///
/// Rules are never deleted; terminal rules stay for history.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Insert rules as one unit: either all are stored or none
    async fn insert_all(&self, rules: Vec<AutomationRule>) -> StoreResult<()>;

    /// Replace an existing rule
    async fn update(&self, rule: AutomationRule) -> StoreResult<()>;

    async fn get(&self, id: RuleId) -> StoreResult<Option<AutomationRule>>;

    async fn list_by_status(&self, status: RuleStatus) -> StoreResult<Vec<AutomationRule>>;

    async fn list_by_oco_group(&self, group: OcoGroupId) -> StoreResult<Vec<AutomationRule>>;

    async fn list_by_plan(&self, plan_id: Uuid) -> StoreResult<Vec<AutomationRule>>;
}

/// Append-only execution history of rule fires
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    async fn append(&self, record: ExecutionRecord) -> StoreResult<()>;

    /// Replace a record (used to back-fill the broker order ID)
    async fn update(&self, record: ExecutionRecord) -> StoreResult<()>;

    /// Records for a rule, oldest first
    async fn list_by_rule(&self, rule_id: RuleId) -> StoreResult<Vec<ExecutionRecord>>;

    /// Record created for a queued order, if any
    async fn find_by_order(&self, order_id: OrderId) -> StoreResult<Option<ExecutionRecord>>;
}

/// Repository for scaled-exit plans and their event history
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn insert(&self, plan: ScaledExitPlan) -> StoreResult<()>;

    async fn update(&self, plan: ScaledExitPlan) -> StoreResult<()>;

    async fn get(&self, id: PlanId) -> StoreResult<Option<ScaledExitPlan>>;

    /// Plans filtered by status, or all plans when `status` is `None`
    async fn list(&self, status: Option<PlanStatus>) -> StoreResult<Vec<ScaledExitPlan>>;

    async fn append_event(&self, event: PlanEvent) -> StoreResult<()>;

    /// Events for a plan, oldest first
    async fn events(&self, plan_id: PlanId) -> StoreResult<Vec<PlanEvent>>;
}

/// Persisted history of queued orders
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert or replace
    async fn save(&self, order: QueuedOrder) -> StoreResult<()>;

    async fn get(&self, id: OrderId) -> StoreResult<Option<QueuedOrder>>;

    async fn list_by_status(&self, status: QueuedOrderStatus) -> StoreResult<Vec<QueuedOrder>>;
}

/// Storage of the single current-version risk configuration row
#[async_trait]
pub trait RiskConfigRepository: Send + Sync {
    /// Load the current row, `None` if never written
    async fn load(&self) -> StoreResult<Option<RiskConfig>>;

    /// Persist the current row
    async fn save(&self, config: &RiskConfig) -> StoreResult<()>;
}

/// Closed-position history used for realized daily P&L
#[async_trait]
pub trait TradeHistory: Send + Sync {
    async fn record(&self, trade: ClosedTrade) -> StoreResult<()>;

    /// Trades closed at or after `since`
    async fn closed_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<ClosedTrade>>;
}
