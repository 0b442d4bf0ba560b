use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use vigil_core::{ExecutionRecord, OrderId, RuleId};
use vigil_ports::{ExecutionLog, StoreError, StoreResult};

/// In-memory execution history
pub struct InMemoryExecutionLog {
    /// Records by rule, in append order
    by_rule: Arc<DashMap<RuleId, Vec<ExecutionRecord>>>,
    /// Index: queued order -> rule
    order_index: Arc<DashMap<OrderId, RuleId>>,
}

impl InMemoryExecutionLog {
    pub fn new() -> Self {
        Self {
            by_rule: Arc::new(DashMap::new()),
            order_index: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryExecutionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryExecutionLog {
    fn clone(&self) -> Self {
        Self {
            by_rule: Arc::clone(&self.by_rule),
            order_index: Arc::clone(&self.order_index),
        }
    }
}

#[async_trait]
impl ExecutionLog for InMemoryExecutionLog {
    async fn append(&self, record: ExecutionRecord) -> StoreResult<()> {
        if let Some(order_id) = record.order_id {
            self.order_index.insert(order_id, record.rule_id);
        }
        self.by_rule.entry(record.rule_id).or_default().push(record);
        Ok(())
    }

    async fn update(&self, record: ExecutionRecord) -> StoreResult<()> {
        let mut records = self
            .by_rule
            .get_mut(&record.rule_id)
            .ok_or_else(|| StoreError::NotFound(format!("executions for rule {}", record.rule_id)))?;
        let slot = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| StoreError::NotFound(format!("execution {}", record.id)))?;
        *slot = record;
        Ok(())
    }

    async fn list_by_rule(&self, rule_id: RuleId) -> StoreResult<Vec<ExecutionRecord>> {
        Ok(self
            .by_rule
            .get(&rule_id)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn find_by_order(&self, order_id: OrderId) -> StoreResult<Option<ExecutionRecord>> {
        let Some(rule_id) = self.order_index.get(&order_id).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self.by_rule.get(&rule_id).and_then(|records| {
            records
                .iter()
                .find(|r| r.order_id == Some(order_id))
                .cloned()
        }))
    }
}
