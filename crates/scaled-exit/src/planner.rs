use log::{info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;
use vigil_core::{
    AutomationRule, IntentSource, OrderId, OrderType, PlanEvent, PlanEventKind, PlanId,
    PlanStatus, RuleStatus, RuleType, ScaledExitPlan, TimeInForce, TradeIntent, TriggerType,
};
use vigil_ports::{Clock, IntentSink, PlanRepository, RuleRepository};

use crate::error::{Error, Result};
use crate::plan::{self, NewPlan, PlanStep, PlanUpdate};

/// One exit order placed by a plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanExit {
    pub plan_id: PlanId,
    /// `target N` or `trailing`
    pub leg: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub order_id: OrderId,
}

/// What one tick did to one plan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanTickOutcome {
    pub exits: Vec<PlanExit>,
    pub completed: bool,
    /// Exits the sink refused; the leg stays armed for the next tick
    pub errors: Vec<String>,
}

/// Owns scaled-exit plans and drives them on each tick
pub struct ScaledExitPlanner {
    plans: Arc<dyn PlanRepository>,
    rules: Arc<dyn RuleRepository>,
    clock: Arc<dyn Clock>,
}

impl ScaledExitPlanner {
    pub fn new(
        plans: Arc<dyn PlanRepository>,
        rules: Arc<dyn RuleRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            plans,
            rules,
            clock,
        }
    }

    /// Validate and store a plan with one shadow take-profit rule per target
    pub async fn create_plan(&self, request: NewPlan) -> Result<ScaledExitPlan> {
        let now = self.clock.now();
        let mut plan = plan::build_plan(request, now)?;

        let shadows: Vec<AutomationRule> = plan
            .targets
            .iter()
            .enumerate()
            .map(|(index, target)| AutomationRule {
                id: Uuid::new_v4(),
                symbol: plan.symbol.clone(),
                name: format!("Scaled exit {} target {}", plan.symbol, index + 1),
                rule_type: RuleType::TakeProfit,
                trigger_type: TriggerType::PercentGain,
                trigger_value: target.target_percent,
                order_side: plan.direction.closing_side(),
                order_type: OrderType::Market,
                quantity: plan.target_quantity(target),
                limit_price: None,
                time_in_force: TimeInForce::Day,
                oco_group_id: None,
                entry_price: Some(plan.entry_price),
                high_water_mark: None,
                plan_id: Some(plan.id),
                status: RuleStatus::Active,
                created_at: now,
                updated_at: now,
                triggered_at: None,
                expires_at: None,
            })
            .collect();
        for (target, shadow) in plan.targets.iter_mut().zip(&shadows) {
            target.rule_id = Some(shadow.id);
        }

        self.rules.insert_all(shadows).await?;
        self.plans.insert(plan.clone()).await?;
        self.plans
            .append_event(
                PlanEvent::new(plan.id, PlanEventKind::Created, now)
                    .with_quantity(plan.total_quantity)
                    .with_price(plan.entry_price)
                    .with_message(format!(
                        "{} targets, trailing leg: {}",
                        plan.targets.len(),
                        plan.trailing.is_some()
                    )),
            )
            .await?;

        info!(
            "[PLAN] Created plan {} on {}: {} shares from {}",
            plan.id, plan.symbol, plan.total_quantity, plan.entry_price
        );
        Ok(plan)
    }

    pub async fn get_plan(&self, id: PlanId) -> Result<ScaledExitPlan> {
        self.plans.get(id).await?.ok_or(Error::PlanNotFound(id))
    }

    pub async fn list_plans(&self, status: Option<PlanStatus>) -> Result<Vec<ScaledExitPlan>> {
        Ok(self.plans.list(status).await?)
    }

    pub async fn plan_events(&self, id: PlanId) -> Result<Vec<PlanEvent>> {
        self.get_plan(id).await?;
        Ok(self.plans.events(id).await?)
    }

    async fn active_plan(&self, id: PlanId) -> Result<ScaledExitPlan> {
        let plan = self.get_plan(id).await?;
        if !plan.is_active() {
            return Err(Error::NotActive {
                id,
                status: plan.status,
            });
        }
        Ok(plan)
    }

    /// Retune the trailing leg of an active plan
    pub async fn update_plan(&self, id: PlanId, update: PlanUpdate) -> Result<ScaledExitPlan> {
        let mut plan = self.active_plan(id).await?;
        let now = self.clock.now();
        plan::apply_update(&mut plan, &update, now)?;
        self.plans.update(plan.clone()).await?;

        let message = plan
            .trailing
            .as_ref()
            .map(|l| {
                format!(
                    "trailing activation {}%, trail {}%",
                    l.activation_percent, l.trail_percent
                )
            })
            .unwrap_or_default();
        self.plans
            .append_event(PlanEvent::new(id, PlanEventKind::Updated, now).with_message(message))
            .await?;
        info!("[PLAN] Updated plan {}", id);
        Ok(plan)
    }

    /// Cancel an active plan and its shadow rules
    pub async fn cancel_plan(&self, id: PlanId) -> Result<ScaledExitPlan> {
        let mut plan = self.active_plan(id).await?;
        let now = self.clock.now();
        plan.status = PlanStatus::Cancelled;
        plan.updated_at = now;
        self.plans.update(plan.clone()).await?;
        self.close_shadow_rules(id, RuleStatus::Cancelled).await?;
        self.plans
            .append_event(PlanEvent::new(id, PlanEventKind::Cancelled, now))
            .await?;
        info!("[PLAN] Cancelled plan {}", id);
        Ok(plan)
    }

    async fn close_shadow_rules(&self, plan_id: PlanId, status: RuleStatus) -> Result<usize> {
        let now = self.clock.now();
        let mut closed = 0;
        for mut rule in self.rules.list_by_plan(plan_id).await? {
            if rule.is_active() {
                rule.transition(status, now);
                self.rules.update(rule).await?;
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn trigger_shadow_rule(&self, rule_id: Option<Uuid>) -> Result<()> {
        let Some(rule_id) = rule_id else {
            return Ok(());
        };
        if let Some(mut rule) = self.rules.get(rule_id).await?
            && rule.is_active()
        {
            rule.transition(RuleStatus::Triggered, self.clock.now());
            self.rules.update(rule).await?;
        }
        Ok(())
    }

    /// Drive one plan at the current price
    ///
    /// Applies the steps of [`plan::evaluate`] and persists the plan. An exit
    /// the sink refuses leaves its leg untriggered and is reported, not
    /// raised; storage failures are raised.
    pub async fn on_tick(
        &self,
        plan_id: PlanId,
        price: Decimal,
        sink: &dyn IntentSink,
    ) -> Result<PlanTickOutcome> {
        let mut plan = self.get_plan(plan_id).await?;
        let mut outcome = PlanTickOutcome::default();
        let steps = plan::evaluate(&plan, price);
        if steps.is_empty() {
            return Ok(outcome);
        }
        let now = self.clock.now();

        for step in steps {
            match step {
                PlanStep::ExitTarget { index, quantity } => {
                    // Never sell more than remains
                    if quantity > plan.remaining_quantity {
                        continue;
                    }
                    let leg = format!("target {}", index + 1);
                    let Some(order_id) = self
                        .submit_exit(&plan, &leg, quantity, price, sink, &mut outcome)
                        .await
                    else {
                        continue;
                    };
                    let rule_id = match plan.targets.get_mut(index) {
                        Some(target) => {
                            target.triggered = true;
                            target.triggered_at = Some(now);
                            target.fill_price = Some(price);
                            target.order_id = Some(order_id);
                            target.rule_id
                        }
                        None => None,
                    };
                    plan.remaining_quantity -= quantity;
                    self.trigger_shadow_rule(rule_id).await?;
                    self.plans
                        .append_event(
                            PlanEvent::new(plan.id, PlanEventKind::TargetTriggered { index }, now)
                                .with_price(price)
                                .with_quantity(quantity)
                                .with_order(order_id),
                        )
                        .await?;
                    outcome.exits.push(PlanExit {
                        plan_id: plan.id,
                        leg,
                        quantity,
                        price,
                        order_id,
                    });
                }
                PlanStep::ActivateTrailing => {
                    if let Some(trailing) = plan.trailing.as_mut() {
                        trailing.activated = true;
                        trailing.activated_at = Some(now);
                        trailing.high_water_mark = Some(price);
                    }
                    info!("[PLAN] Plan {} trailing leg armed at {}", plan.id, price);
                    self.plans
                        .append_event(
                            PlanEvent::new(plan.id, PlanEventKind::TrailingActivated, now)
                                .with_price(price),
                        )
                        .await?;
                }
                PlanStep::RaiseHighWaterMark => {
                    if let Some(trailing) = plan.trailing.as_mut() {
                        trailing.high_water_mark = Some(price);
                    }
                    self.plans
                        .append_event(
                            PlanEvent::new(plan.id, PlanEventKind::HighWaterMark, now)
                                .with_price(price),
                        )
                        .await?;
                }
                PlanStep::ExitTrailing { stop_price } => {
                    let quantity = plan.remaining_quantity;
                    if quantity <= Decimal::ZERO {
                        continue;
                    }
                    let Some(order_id) = self
                        .submit_exit(&plan, "trailing", quantity, price, sink, &mut outcome)
                        .await
                    else {
                        continue;
                    };
                    if let Some(trailing) = plan.trailing.as_mut() {
                        trailing.triggered = true;
                        trailing.order_id = Some(order_id);
                    }
                    plan.remaining_quantity = Decimal::ZERO;
                    self.plans
                        .append_event(
                            PlanEvent::new(plan.id, PlanEventKind::TrailingTriggered, now)
                                .with_price(price)
                                .with_quantity(quantity)
                                .with_order(order_id)
                                .with_message(format!("stop {stop_price}")),
                        )
                        .await?;
                    outcome.exits.push(PlanExit {
                        plan_id: plan.id,
                        leg: "trailing".to_string(),
                        quantity,
                        price,
                        order_id,
                    });
                }
            }
        }

        if plan.remaining_quantity <= Decimal::ZERO && plan.is_active() {
            plan.remaining_quantity = Decimal::ZERO;
            plan.status = PlanStatus::Completed;
            plan.completed_at = Some(now);
            outcome.completed = true;
        }
        plan.updated_at = now;
        self.plans.update(plan.clone()).await?;

        if outcome.completed {
            self.close_shadow_rules(plan.id, RuleStatus::Cancelled).await?;
            self.plans
                .append_event(PlanEvent::new(plan.id, PlanEventKind::Completed, now).with_price(price))
                .await?;
            info!("[PLAN] Plan {} on {} completed", plan.id, plan.symbol);
        }
        Ok(outcome)
    }

    async fn submit_exit(
        &self,
        plan: &ScaledExitPlan,
        leg: &str,
        quantity: Decimal,
        price: Decimal,
        sink: &dyn IntentSink,
        outcome: &mut PlanTickOutcome,
    ) -> Option<OrderId> {
        let intent = TradeIntent::market_exit(
            plan.symbol.clone(),
            plan.direction.closing_side(),
            quantity,
            IntentSource::ScaledExit {
                plan_id: plan.id,
                leg: leg.to_string(),
            },
        )
        .with_reason(format!("scaled exit {leg} at {price}"));

        match sink.submit_intent(intent).await {
            Ok(order_id) => {
                info!(
                    "[PLAN] Plan {} {} sells {} {} at {}",
                    plan.id, leg, quantity, plan.symbol, price
                );
                Some(order_id)
            }
            Err(e) => {
                warn!("[PLAN] Plan {} {} exit not placed: {}", plan.id, leg, e);
                outcome.errors.push(format!("plan {} {leg}: {e}", plan.id));
                None
            }
        }
    }
}
