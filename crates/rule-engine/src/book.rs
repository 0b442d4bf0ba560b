//! Rule Book
//!
//! Owns rule lifecycle: creation, status transitions, OCO group
//! cancellation and per-symbol evaluation against live prices.

use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use vigil_core::{
    AutomationRule, BrokerPosition, ExecutionRecord, IntentSource, OcoGroupId, OrderId, Quote,
    RuleId, RuleStatus, TradeIntent,
};
use vigil_ports::{Clock, ExecutionLog, IntentSink, RuleRepository};

use crate::error::{Error, Result};
use crate::planning::{self, NewRule, OcoPair, OcoRequest, QuickSetup};
use crate::trigger;

/// An active rule annotated with live market state
#[derive(Debug, Clone, PartialEq)]
pub struct RuleView {
    pub rule: AutomationRule,
    pub current_price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    /// `trigger_price - current_price`
    pub distance_to_trigger: Option<Decimal>,
    /// Distance in percent of the current price
    pub distance_pct: Option<Decimal>,
}

/// A rule that fired and was handed to the execution pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFire {
    pub rule_id: RuleId,
    pub order_id: OrderId,
    pub trigger_price: Decimal,
}

/// Outcome of evaluating one symbol's rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolEvaluation {
    pub fired: Vec<RuleFire>,
    /// OCO siblings cancelled because a group member fired
    pub cancelled_siblings: usize,
    /// One entry per rule that could not be evaluated or executed
    pub errors: Vec<String>,
}

/// Rule store and OCO coordinator
pub struct RuleBook {
    rules: Arc<dyn RuleRepository>,
    executions: Arc<dyn ExecutionLog>,
    clock: Arc<dyn Clock>,
}

impl RuleBook {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        executions: Arc<dyn ExecutionLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules,
            executions,
            clock,
        }
    }

    /// Create a manually specified rule
    ///
    /// `position` is the live position in the rule's symbol, if any; it can
    /// stand in for a missing entry price.
    pub async fn create_rule(
        &self,
        request: NewRule,
        position: Option<&BrokerPosition>,
    ) -> Result<AutomationRule> {
        let rule = planning::build_rule(request, position, self.clock.now())?;
        self.rules.insert_all(vec![rule.clone()]).await?;
        info!(
            "[RULES] Created {:?} rule {} on {} ({:?} {})",
            rule.rule_type, rule.id, rule.symbol, rule.trigger_type, rule.trigger_value
        );
        Ok(rule)
    }

    /// Create stop/target/trailing exits for a position in one step
    pub async fn create_quick_setup(
        &self,
        setup: QuickSetup,
        position: Option<&BrokerPosition>,
    ) -> Result<Vec<AutomationRule>> {
        let rules = planning::build_quick_setup(setup, position, self.clock.now())?;
        self.rules.insert_all(rules.clone()).await?;
        info!(
            "[RULES] Quick setup created {} rules on {}",
            rules.len(),
            rules.first().map(|r| r.symbol.as_str()).unwrap_or_default()
        );
        Ok(rules)
    }

    /// Create a take-profit / stop-loss pair sharing one OCO group
    pub async fn create_oco(&self, request: OcoRequest) -> Result<OcoPair> {
        let pair = planning::build_oco(request, self.clock.now())?;
        self.rules
            .insert_all(vec![pair.take_profit.clone(), pair.stop_loss.clone()])
            .await?;
        info!(
            "[RULES] Created OCO group {} on {}: take profit {}, stop loss {}",
            pair.group_id,
            pair.take_profit.symbol,
            pair.take_profit.trigger_value,
            pair.stop_loss.trigger_value
        );
        Ok(pair)
    }

    pub async fn get(&self, id: RuleId) -> Result<AutomationRule> {
        self.rules.get(id).await?.ok_or(Error::RuleNotFound(id))
    }

    pub async fn cancel_rule(&self, id: RuleId) -> Result<AutomationRule> {
        let rule = self.transition(id, RuleStatus::Cancelled).await?;
        info!("[RULES] Cancelled rule {}", id);
        Ok(rule)
    }

    pub async fn expire_rule(&self, id: RuleId) -> Result<AutomationRule> {
        self.transition(id, RuleStatus::Expired).await
    }

    /// Mark a rule as fired
    ///
    /// Only an active rule can be triggered, so at most one leg of an OCO
    /// group ever reaches this state.
    pub async fn mark_triggered(&self, id: RuleId) -> Result<AutomationRule> {
        self.transition(id, RuleStatus::Triggered).await
    }

    /// Cancel every active member of `group` except `except`
    pub async fn cancel_oco_group(
        &self,
        group: OcoGroupId,
        except: Option<RuleId>,
    ) -> Result<usize> {
        let now = self.clock.now();
        let mut cancelled = 0;
        for mut rule in self.rules.list_by_oco_group(group).await? {
            if Some(rule.id) == except || !rule.is_active() {
                continue;
            }
            rule.transition(RuleStatus::Cancelled, now);
            self.rules.update(rule).await?;
            cancelled += 1;
        }
        if cancelled > 0 {
            info!("[RULES] OCO group {}: cancelled {} sibling(s)", group, cancelled);
        }
        Ok(cancelled)
    }

    async fn transition(&self, id: RuleId, status: RuleStatus) -> Result<AutomationRule> {
        let mut rule = self.get(id).await?;
        if !rule.is_active() {
            return Err(Error::InvalidTransition {
                id,
                from: rule.status,
                to: status,
            });
        }
        rule.transition(status, self.clock.now());
        self.rules.update(rule.clone()).await?;
        Ok(rule)
    }

    pub async fn list_active_rules(&self) -> Result<Vec<AutomationRule>> {
        Ok(self.rules.list_by_status(RuleStatus::Active).await?)
    }

    /// Distinct symbols that have at least one active rule
    pub async fn active_symbols(&self) -> Result<Vec<String>> {
        let mut symbols: Vec<String> = self
            .list_active_rules()
            .await?
            .into_iter()
            .map(|r| r.symbol)
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }

    /// Active rules annotated with current price and distance to trigger
    pub async fn list_active(
        &self,
        prices: &HashMap<String, Decimal>,
        positions: &[BrokerPosition],
    ) -> Result<Vec<RuleView>> {
        let views = self
            .list_active_rules()
            .await?
            .into_iter()
            .map(|rule| {
                let position = positions
                    .iter()
                    .find(|p| p.symbol.eq_ignore_ascii_case(&rule.symbol));
                let current_price = prices.get(&rule.symbol).copied();
                let trigger_price = trigger::resolved_trigger_price(&rule, position);
                let distance_to_trigger = current_price
                    .zip(trigger_price)
                    .map(|(current, target)| target - current);
                let distance_pct = distance_to_trigger
                    .zip(current_price)
                    .filter(|(_, current)| *current > Decimal::ZERO)
                    .map(|(distance, current)| distance / current * Decimal::ONE_HUNDRED);
                RuleView {
                    rule,
                    current_price,
                    trigger_price,
                    distance_to_trigger,
                    distance_pct,
                }
            })
            .collect();
        Ok(views)
    }

    /// Move every active rule past its expiry to `expired`
    pub async fn sweep_expired(&self) -> Result<Vec<RuleId>> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for mut rule in self.list_active_rules().await? {
            if !rule.is_expired(now) {
                continue;
            }
            rule.transition(RuleStatus::Expired, now);
            self.rules.update(rule.clone()).await?;
            expired.push(rule.id);
        }
        if !expired.is_empty() {
            info!("[RULES] Expired {} rule(s)", expired.len());
        }
        Ok(expired)
    }

    /// Move the high-water marks of a symbol's trailing stops toward `price`
    pub async fn ratchet_trailing(&self, symbol: &str, price: Decimal) -> Result<usize> {
        let mut moved = 0;
        for mut rule in self.list_active_rules().await? {
            if rule.symbol != symbol || !trigger::ratchet(&mut rule, price) {
                continue;
            }
            rule.updated_at = self.clock.now();
            debug!("[RULES] Trailing stop {} high-water mark -> {}", rule.id, price);
            self.rules.update(rule).await?;
            moved += 1;
        }
        Ok(moved)
    }

    /// Evaluate a symbol's active rules against a quote
    ///
    /// Rules are processed one at a time and re-read before evaluation, so
    /// an OCO sibling cancelled earlier in the pass never fires. Shadow rules
    /// owned by a scaled-exit plan are skipped. A failing rule is reported in
    /// `errors` and does not stop the pass.
    pub async fn evaluate_symbol(
        &self,
        quote: &Quote,
        position: Option<&BrokerPosition>,
        sink: &dyn IntentSink,
    ) -> Result<SymbolEvaluation> {
        let mut evaluation = SymbolEvaluation::default();
        let Some(price) = quote.reference_price() else {
            evaluation
                .errors
                .push(format!("{}: quote has no usable price", quote.symbol));
            return Ok(evaluation);
        };

        let candidates: Vec<RuleId> = self
            .list_active_rules()
            .await?
            .into_iter()
            .filter(|r| r.symbol == quote.symbol && !r.is_plan_owned())
            .map(|r| r.id)
            .collect();

        for id in candidates {
            match self.evaluate_rule(id, price, position, sink).await {
                Ok(Some((fire, cancelled))) => {
                    evaluation.fired.push(fire);
                    evaluation.cancelled_siblings += cancelled;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("[RULES] Rule {} evaluation failed: {}", id, e);
                    evaluation.errors.push(format!("rule {id}: {e}"));
                }
            }
        }
        Ok(evaluation)
    }

    async fn evaluate_rule(
        &self,
        id: RuleId,
        price: Decimal,
        position: Option<&BrokerPosition>,
        sink: &dyn IntentSink,
    ) -> Result<Option<(RuleFire, usize)>> {
        let now = self.clock.now();
        let Some(rule) = self.rules.get(id).await? else {
            return Ok(None);
        };
        if !trigger::fires_at(&rule, price, position, now) {
            return Ok(None);
        }
        info!(
            "[RULES] {} fired on {} at {} ({:?} {})",
            rule.name, rule.symbol, price, rule.trigger_type, rule.trigger_value
        );

        let intent = fire_intent(&rule, price);
        let mut record = ExecutionRecord {
            id: Uuid::new_v4(),
            rule_id: rule.id,
            symbol: rule.symbol.clone(),
            side: rule.order_side,
            trigger_price: price,
            quantity: rule.quantity,
            order_id: None,
            broker_order_id: None,
            error: None,
            executed_at: now,
        };

        let order_id = match sink.submit_intent(intent).await {
            Ok(order_id) => order_id,
            Err(e) => {
                // The rule stays active and is evaluated again next tick;
                // a refusal identical to the last one is not recorded again
                let reason = e.to_string();
                let repeated = self
                    .executions
                    .list_by_rule(rule.id)
                    .await?
                    .last()
                    .is_some_and(|last| {
                        last.order_id.is_none() && last.error.as_deref() == Some(reason.as_str())
                    });
                if repeated {
                    debug!("[RULES] {} still not placed: {}", rule.name, reason);
                } else {
                    record.error = Some(reason);
                    self.executions.append(record).await?;
                }
                return Err(Error::NotPlaced(e));
            }
        };

        self.mark_triggered(rule.id).await?;
        let cancelled = match rule.oco_group_id {
            Some(group) => self.cancel_oco_group(group, Some(rule.id)).await?,
            None => 0,
        };
        record.order_id = Some(order_id);
        self.executions.append(record).await?;

        Ok(Some((
            RuleFire {
                rule_id: rule.id,
                order_id,
                trigger_price: price,
            },
            cancelled,
        )))
    }

    /// Execution history of a rule, oldest first
    pub async fn executions(&self, rule_id: RuleId) -> Result<Vec<ExecutionRecord>> {
        Ok(self.executions.list_by_rule(rule_id).await?)
    }

    /// Record the broker order ID on the execution created for `order_id`
    ///
    /// Returns false if no execution refers to the order or it is already set.
    pub async fn record_broker_order(&self, order_id: OrderId, broker_order_id: &str) -> Result<bool> {
        let Some(mut record) = self.executions.find_by_order(order_id).await? else {
            return Ok(false);
        };
        if record.broker_order_id.is_some() {
            return Ok(false);
        }
        record.broker_order_id = Some(broker_order_id.to_string());
        self.executions.update(record).await?;
        Ok(true)
    }
}

/// Trade intent placed when `rule` fires at `price`
fn fire_intent(rule: &AutomationRule, price: Decimal) -> TradeIntent {
    let exit = rule.rule_type.is_exit();
    TradeIntent {
        symbol: rule.symbol.clone(),
        side: rule.order_side,
        order_type: rule.order_type,
        quantity: rule.quantity,
        limit_price: rule.limit_price,
        stop_price: None,
        time_in_force: rule.time_in_force,
        source: IntentSource::Rule { rule_id: rule.id },
        reduces_position: exit,
        skip_regime_check: exit,
        reason: format!("{} triggered at {}", rule.name, price),
    }
}
