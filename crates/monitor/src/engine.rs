use async_trait::async_trait;
use futures_util::future::join_all;
use log::info;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use vigil_core::{
    AutomationRule, BrokerPosition, ExecutionRecord, IntentSource, OrderId, OrderRequest,
    PlanEvent, PlanId, PlanStatus, QueuedOrder, QueuedOrderStatus, RiskConfig, RiskConfigUpdate,
    RuleId, ScaledExitPlan, Side, TradeIntent,
};
use vigil_gateway::{PaperBroker, StaticRegimeSignal, TimeoutBroker};
use vigil_order_queue::{
    BracketOrder, CancelReport, DrainReport, NewOrder, OrderQueue, SyncReport,
};
use vigil_ports::{
    Broker, Clock, ExecutionLog, IntentError, IntentSink, OrderRepository, PlanRepository,
    QuoteSource, RegimeSignal, RiskConfigRepository, RuleRepository, TradeHistory,
};
use vigil_risk_gate::{RiskDecision, RiskGatekeeper};
use vigil_rules::{NewRule, OcoPair, OcoRequest, QuickSetup, RuleBook, RuleView};
use vigil_scaled_exit::{NewPlan, PlanUpdate, ScaledExitPlanner};
use vigil_store::MemoryStore;

use crate::config::EngineConfig;
use crate::error::Result;

/// External collaborators the engine is built from
#[derive(Clone)]
pub struct EngineParts {
    pub broker: Arc<dyn Broker>,
    pub quotes: Arc<dyn QuoteSource>,
    pub regime: Arc<dyn RegimeSignal>,
    pub rules: Arc<dyn RuleRepository>,
    pub executions: Arc<dyn ExecutionLog>,
    pub plans: Arc<dyn PlanRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub risk_config: Arc<dyn RiskConfigRepository>,
    pub trades: Arc<dyn TradeHistory>,
    pub clock: Arc<dyn Clock>,
}

impl EngineParts {
    /// Paper broker and quotes over an in-memory store
    pub fn paper(
        store: &MemoryStore,
        broker: &PaperBroker,
        regime: &StaticRegimeSignal,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            broker: Arc::new(broker.clone()),
            quotes: Arc::new(broker.clone()),
            regime: Arc::new(regime.clone()),
            rules: Arc::new(store.rules.clone()),
            executions: Arc::new(store.executions.clone()),
            plans: Arc::new(store.plans.clone()),
            orders: Arc::new(store.orders.clone()),
            risk_config: Arc::new(store.risk_config.clone()),
            trades: Arc::new(store.trades.clone()),
            clock,
        }
    }
}

pub(crate) struct EngineInner {
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) quotes: Arc<dyn QuoteSource>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
    pub(crate) rules: RuleBook,
    pub(crate) planner: ScaledExitPlanner,
    pub(crate) gate: RiskGatekeeper,
    pub(crate) queue: OrderQueue,
    /// Held for the duration of a tick
    pub(crate) tick_lock: Mutex<()>,
}

/// Handle on the running pipeline
///
/// Cheap to clone; every clone drives the same components.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
    /// Build every component and hydrate persisted state
    ///
    /// The kill switch mirror is loaded (or the risk seed written) and live
    /// queued orders are restored before the handle is returned.
    pub async fn init(parts: EngineParts, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let broker: Arc<dyn Broker> =
            Arc::new(TimeoutBroker::new(parts.broker, config.broker_timeout()));
        let clock = parts.clock;

        let rules = RuleBook::new(parts.rules.clone(), parts.executions, clock.clone());
        let planner = ScaledExitPlanner::new(parts.plans, parts.rules, clock.clone());
        let gate = RiskGatekeeper::new(
            parts.risk_config,
            broker.clone(),
            parts.trades,
            parts.regime,
            clock.clone(),
        )
        .with_seed(config.risk.to_risk_config(clock.now()));
        let queue = OrderQueue::new(
            broker.clone(),
            parts.orders,
            clock.clone(),
            config.queue.clone(),
        );

        gate.hydrate().await?;
        let restored = queue.restore().await?;
        let kill_switch = gate.is_kill_switch_active().await?;
        info!(
            "[MONITOR] Engine ready (broker {}, kill switch {}, {} live orders restored)",
            broker.name(),
            if kill_switch { "ACTIVE" } else { "off" },
            restored
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                broker,
                quotes: parts.quotes,
                clock,
                config,
                rules,
                planner,
                gate,
                queue,
                tick_lock: Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn rule_book(&self) -> &RuleBook {
        &self.inner.rules
    }

    pub fn planner(&self) -> &ScaledExitPlanner {
        &self.inner.planner
    }

    pub fn gatekeeper(&self) -> &RiskGatekeeper {
        &self.inner.gate
    }

    pub fn order_queue(&self) -> &OrderQueue {
        &self.inner.queue
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    async fn position(&self, symbol: &str) -> Result<Option<BrokerPosition>> {
        let positions = self.inner.broker.get_positions().await?;
        Ok(positions
            .into_iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(symbol.trim())))
    }

    // Rules

    pub async fn create_rule(&self, request: NewRule) -> Result<AutomationRule> {
        let position = self.position(&request.symbol).await?;
        Ok(self.inner.rules.create_rule(request, position.as_ref()).await?)
    }

    pub async fn create_quick_setup(&self, setup: QuickSetup) -> Result<Vec<AutomationRule>> {
        let position = self.position(&setup.symbol).await?;
        Ok(self
            .inner
            .rules
            .create_quick_setup(setup, position.as_ref())
            .await?)
    }

    pub async fn create_oco(&self, request: OcoRequest) -> Result<OcoPair> {
        Ok(self.inner.rules.create_oco(request).await?)
    }

    /// Active rules annotated with live prices and distance to trigger
    pub async fn list_rules(&self) -> Result<Vec<RuleView>> {
        let positions = self.inner.broker.get_positions().await?;
        let symbols = self.inner.rules.active_symbols().await?;
        let quotes = join_all(
            symbols
                .iter()
                .map(|symbol| self.inner.quotes.get_latest_quote(symbol)),
        )
        .await;
        let prices: HashMap<String, Decimal> = symbols
            .into_iter()
            .zip(quotes)
            .filter_map(|(symbol, quote)| {
                quote.ok().and_then(|q| q.reference_price()).map(|p| (symbol, p))
            })
            .collect();
        Ok(self.inner.rules.list_active(&prices, &positions).await?)
    }

    pub async fn cancel_rule(&self, id: RuleId) -> Result<AutomationRule> {
        Ok(self.inner.rules.cancel_rule(id).await?)
    }

    pub async fn rule_executions(&self, id: RuleId) -> Result<Vec<ExecutionRecord>> {
        Ok(self.inner.rules.executions(id).await?)
    }

    // Scaled exits

    pub async fn create_plan(&self, request: NewPlan) -> Result<ScaledExitPlan> {
        Ok(self.inner.planner.create_plan(request).await?)
    }

    pub async fn get_plan(&self, id: PlanId) -> Result<ScaledExitPlan> {
        Ok(self.inner.planner.get_plan(id).await?)
    }

    pub async fn list_plans(&self, status: Option<PlanStatus>) -> Result<Vec<ScaledExitPlan>> {
        Ok(self.inner.planner.list_plans(status).await?)
    }

    pub async fn plan_events(&self, id: PlanId) -> Result<Vec<PlanEvent>> {
        Ok(self.inner.planner.plan_events(id).await?)
    }

    pub async fn update_plan(&self, id: PlanId, update: PlanUpdate) -> Result<ScaledExitPlan> {
        Ok(self.inner.planner.update_plan(id, update).await?)
    }

    pub async fn cancel_plan(&self, id: PlanId) -> Result<ScaledExitPlan> {
        Ok(self.inner.planner.cancel_plan(id).await?)
    }

    // Risk

    pub async fn risk_config(&self) -> Result<RiskConfig> {
        Ok(self.inner.gate.get_config().await?)
    }

    pub async fn update_risk_config(&self, update: RiskConfigUpdate) -> Result<RiskConfig> {
        Ok(self.inner.gate.update_config(update).await?)
    }

    pub async fn activate_kill_switch(&self, reason: &str) -> Result<RiskConfig> {
        Ok(self.inner.gate.activate_kill_switch(reason).await?)
    }

    pub async fn deactivate_kill_switch(&self) -> Result<RiskConfig> {
        Ok(self.inner.gate.deactivate_kill_switch().await?)
    }

    pub async fn is_kill_switch_active(&self) -> Result<bool> {
        Ok(self.inner.gate.is_kill_switch_active().await?)
    }

    // Order queue

    /// Risk-check a manual order payload; rejection is an error
    async fn approve(&self, request: &OrderRequest) -> Result<RiskDecision> {
        let intent = TradeIntent::from_request(request, IntentSource::Manual);
        Ok(self.inner.gate.check_intent(&intent).await?.into_result()?)
    }

    /// Queue a manual order after the risk gate approves it
    ///
    /// Manual orders are queued at the requested size.
    pub async fn enqueue(&self, order: NewOrder) -> Result<QueuedOrder> {
        self.approve(&order.request).await?;
        Ok(self.inner.queue.enqueue(order).await?)
    }

    /// Queue several manual orders; nothing is queued unless all are approved
    pub async fn enqueue_batch(&self, orders: Vec<NewOrder>) -> Result<Vec<QueuedOrder>> {
        for order in &orders {
            self.approve(&order.request).await?;
        }
        Ok(self.inner.queue.enqueue_batch(orders).await?)
    }

    pub async fn submit_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<QueuedOrder> {
        self.approve(&OrderRequest::market(symbol, side, quantity))
            .await?;
        Ok(self
            .inner
            .queue
            .submit_market_order(symbol, side, quantity)
            .await?)
    }

    pub async fn submit_limit_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Result<QueuedOrder> {
        self.approve(&OrderRequest::limit(symbol, side, quantity, limit_price))
            .await?;
        Ok(self
            .inner
            .queue
            .submit_limit_order(symbol, side, quantity, limit_price)
            .await?)
    }

    pub async fn submit_stop_loss(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Result<QueuedOrder> {
        self.approve(&OrderRequest::stop(symbol, side, quantity, stop_price))
            .await?;
        Ok(self
            .inner
            .queue
            .submit_stop_loss(symbol, side, quantity, stop_price)
            .await?)
    }

    /// Queue a bracket entry; its exit legs are spawned by a later tick
    pub async fn submit_bracket_order(&self, bracket: BracketOrder) -> Result<QueuedOrder> {
        let entry = match bracket.entry_limit_price {
            Some(price) => OrderRequest::limit(&bracket.symbol, bracket.side, bracket.quantity, price),
            None => OrderRequest::market(&bracket.symbol, bracket.side, bracket.quantity),
        };
        self.approve(&entry).await?;
        Ok(self.inner.queue.submit_bracket_order(bracket).await?)
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Option<QueuedOrder>> {
        Ok(self.inner.queue.get(id).await?)
    }

    pub async fn list_orders(&self, status: Option<QueuedOrderStatus>) -> Vec<QueuedOrder> {
        self.inner.queue.list(status).await
    }

    pub async fn process_queue(&self) -> Result<DrainReport> {
        Ok(self.inner.queue.process_queue().await?)
    }

    pub async fn sync_order_statuses(&self) -> Result<SyncReport> {
        Ok(self.inner.queue.sync_order_statuses().await?)
    }

    pub async fn cancel_order(&self, id: OrderId) -> Result<QueuedOrder> {
        Ok(self.inner.queue.cancel_order(id).await?)
    }

    pub async fn cancel_all_pending_orders(&self) -> Result<CancelReport> {
        Ok(self.inner.queue.cancel_all_pending_orders().await?)
    }

    pub async fn clear_completed(&self) -> usize {
        self.inner.queue.clear_completed().await
    }
}

/// Entry size after the regime's advisory multiplier
///
/// Rounded down to whole shares, never below one share.
pub(crate) fn sized_quantity(quantity: Decimal, multiplier: Decimal) -> Decimal {
    if multiplier >= Decimal::ONE {
        return quantity;
    }
    let scaled = (quantity * multiplier).floor();
    if scaled >= Decimal::ONE {
        scaled
    } else {
        quantity.min(Decimal::ONE)
    }
}

#[async_trait]
impl IntentSink for Engine {
    /// Gate, size and queue an intent from a rule or plan
    async fn submit_intent(&self, intent: TradeIntent) -> std::result::Result<OrderId, IntentError> {
        let decision = self
            .inner
            .gate
            .check_intent(&intent)
            .await
            .map_err(|e| IntentError::Failed(e.to_string()))?;
        if !decision.approved {
            return Err(IntentError::Rejected(decision.reason()));
        }

        let queue_config = self.inner.queue.config();
        let priority = match intent.source {
            IntentSource::Rule { .. } => queue_config.rule_order_priority,
            IntentSource::ScaledExit { .. } => queue_config.exit_order_priority,
            IntentSource::Manual => queue_config.default_priority,
        };
        let mut request = intent.to_request();
        if !intent.reduces_position {
            request.quantity = sized_quantity(intent.quantity, decision.size_multiplier);
        }

        let order = NewOrder::new(request)
            .with_priority(priority)
            .with_metadata(
                "source",
                serde_json::to_value(&intent.source).unwrap_or(Value::Null),
            )
            .with_metadata("reason", intent.reason.clone());
        self.inner
            .queue
            .enqueue(order)
            .await
            .map(|o| o.id)
            .map_err(|e| IntentError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sized_quantity_floors_to_whole_shares() {
        assert_eq!(sized_quantity(dec!(100), dec!(1)), dec!(100));
        assert_eq!(sized_quantity(dec!(100), dec!(0.7)), dec!(70));
        assert_eq!(sized_quantity(dec!(15), dec!(0.5)), dec!(7));
        assert_eq!(sized_quantity(dec!(1), dec!(0.5)), dec!(1));
        assert_eq!(sized_quantity(dec!(0.5), dec!(0.5)), dec!(0.5));
    }
}
