use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;
use vigil_core::{AutomationRule, OcoGroupId, RuleId, RuleStatus};
use vigil_ports::{RuleRepository, StoreError, StoreResult};

/// In-memory rule repository
///
/// Thread-safe storage for rules using DashMap.
pub struct InMemoryRuleRepository {
    /// Rules by ID
    rules: Arc<DashMap<RuleId, AutomationRule>>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
        }
    }

    fn collect<F>(&self, predicate: F) -> Vec<AutomationRule>
    where
        F: Fn(&AutomationRule) -> bool,
    {
        let mut rules: Vec<AutomationRule> = self
            .rules
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.value().clone())
            .collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rules
    }
}

impl Default for InMemoryRuleRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryRuleRepository {
    fn clone(&self) -> Self {
        Self {
            rules: Arc::clone(&self.rules),
        }
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn insert_all(&self, rules: Vec<AutomationRule>) -> StoreResult<()> {
        // Reject the whole batch before writing anything
        if let Some(existing) = rules.iter().find(|r| self.rules.contains_key(&r.id)) {
            return Err(StoreError::Conflict(format!("rule {}", existing.id)));
        }
        for rule in rules {
            self.rules.insert(rule.id, rule);
        }
        Ok(())
    }

    async fn update(&self, rule: AutomationRule) -> StoreResult<()> {
        match self.rules.get_mut(&rule.id) {
            Some(mut entry) => {
                *entry = rule;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("rule {}", rule.id))),
        }
    }

    async fn get(&self, id: RuleId) -> StoreResult<Option<AutomationRule>> {
        Ok(self.rules.get(&id).map(|r| r.value().clone()))
    }

    async fn list_by_status(&self, status: RuleStatus) -> StoreResult<Vec<AutomationRule>> {
        Ok(self.collect(|r| r.status == status))
    }

    async fn list_by_oco_group(&self, group: OcoGroupId) -> StoreResult<Vec<AutomationRule>> {
        Ok(self.collect(|r| r.oco_group_id == Some(group)))
    }

    async fn list_by_plan(&self, plan_id: Uuid) -> StoreResult<Vec<AutomationRule>> {
        Ok(self.collect(|r| r.plan_id == Some(plan_id)))
    }
}
