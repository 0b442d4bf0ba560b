//! Vigil Store
//!
//! Persistence adapters implementing the repository ports.
//!
//! - **In-memory repositories**: `DashMap`-backed, cheap to clone (clones
//!   share one store). Used for tests and single-process deployments.
//! - **JSON risk config**: the risk configuration row (and with it the kill
//!   switch) written to a JSON file so it survives restarts.
//!
//! [`MemoryStore`] bundles one of each repository so a whole engine can be
//! wired against an isolated store.

mod in_memory_execution;
mod in_memory_order;
mod in_memory_plan;
mod in_memory_risk_config;
mod in_memory_rule;
mod in_memory_trade_history;
mod json_risk_config;

pub use in_memory_execution::InMemoryExecutionLog;
pub use in_memory_order::InMemoryOrderRepository;
pub use in_memory_plan::InMemoryPlanRepository;
pub use in_memory_risk_config::InMemoryRiskConfigRepository;
pub use in_memory_rule::InMemoryRuleRepository;
pub use in_memory_trade_history::InMemoryTradeHistory;
pub use json_risk_config::JsonRiskConfigRepository;

/// One in-memory instance of every repository
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub rules: InMemoryRuleRepository,
    pub executions: InMemoryExecutionLog,
    pub plans: InMemoryPlanRepository,
    pub orders: InMemoryOrderRepository,
    pub risk_config: InMemoryRiskConfigRepository,
    pub trades: InMemoryTradeHistory,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}
