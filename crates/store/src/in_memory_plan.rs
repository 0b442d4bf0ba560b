use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use vigil_core::{PlanEvent, PlanId, PlanStatus, ScaledExitPlan};
use vigil_ports::{PlanRepository, StoreError, StoreResult};

/// In-memory scaled-exit plan repository
pub struct InMemoryPlanRepository {
    plans: Arc<DashMap<PlanId, ScaledExitPlan>>,
    /// Event history by plan, in append order
    events: Arc<DashMap<PlanId, Vec<PlanEvent>>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self {
            plans: Arc::new(DashMap::new()),
            events: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryPlanRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryPlanRepository {
    fn clone(&self) -> Self {
        Self {
            plans: Arc::clone(&self.plans),
            events: Arc::clone(&self.events),
        }
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    async fn insert(&self, plan: ScaledExitPlan) -> StoreResult<()> {
        if self.plans.contains_key(&plan.id) {
            return Err(StoreError::Conflict(format!("plan {}", plan.id)));
        }
        self.plans.insert(plan.id, plan);
        Ok(())
    }

    async fn update(&self, plan: ScaledExitPlan) -> StoreResult<()> {
        match self.plans.get_mut(&plan.id) {
            Some(mut entry) => {
                *entry = plan;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("plan {}", plan.id))),
        }
    }

    async fn get(&self, id: PlanId) -> StoreResult<Option<ScaledExitPlan>> {
        Ok(self.plans.get(&id).map(|p| p.value().clone()))
    }

    async fn list(&self, status: Option<PlanStatus>) -> StoreResult<Vec<ScaledExitPlan>> {
        let mut plans: Vec<ScaledExitPlan> = self
            .plans
            .iter()
            .filter(|e| status.is_none_or(|s| e.value().status == s))
            .map(|e| e.value().clone())
            .collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(plans)
    }

    async fn append_event(&self, event: PlanEvent) -> StoreResult<()> {
        self.events.entry(event.plan_id).or_default().push(event);
        Ok(())
    }

    async fn events(&self, plan_id: PlanId) -> StoreResult<Vec<PlanEvent>> {
        Ok(self
            .events
            .get(&plan_id)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }
}
