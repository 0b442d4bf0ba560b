//! Integration test: full ticks over the paper broker and in-memory store

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::watch;
use vigil_clock::ManualClock;
use vigil_core::{
    BrokerPosition, IntentSource, OrderRequest, PlanStatus, QueuedOrderStatus, Regime,
    RuleStatus, RuleType, Side, TradeIntent, TriggerType,
};
use vigil_gateway::{PaperBroker, StaticRegimeSignal};
use vigil_monitor::{Engine, EngineConfig, EngineParts, Error, run_scheduled};
use vigil_order_queue::{BracketOrder, NewOrder};
use vigil_ports::{BrokerError, Clock, IntentSink};
use vigil_rules::{NewRule, OcoRequest};
use vigil_scaled_exit::{NewPlan, TargetSpec, TrailingSpec};
use vigil_store::{JsonRiskConfigRepository, MemoryStore};

struct Harness {
    store: MemoryStore,
    broker: PaperBroker,
    regime: StaticRegimeSignal,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        let _ = env_logger::try_init();
        Self {
            store: MemoryStore::new(),
            broker: PaperBroker::new(),
            regime: StaticRegimeSignal::new(Regime::Trend),
            clock: ManualClock::new(),
        }
    }

    fn parts(&self) -> EngineParts {
        EngineParts::paper(&self.store, &self.broker, &self.regime, self.clock.clone())
    }

    async fn engine(&self) -> Engine {
        self.engine_with(EngineConfig::default()).await
    }

    async fn engine_with(&self, config: EngineConfig) -> Engine {
        Engine::init(self.parts(), config).await.unwrap()
    }

    fn hold(&self, symbol: &str, qty: Decimal, entry: Decimal) {
        self.broker
            .set_position(BrokerPosition::new(symbol, qty, entry, entry));
        self.broker.set_price(symbol, entry);
    }
}

fn stop_loss(symbol: &str, qty: Decimal, stop: Decimal) -> NewRule {
    NewRule {
        symbol: symbol.to_string(),
        name: None,
        rule_type: RuleType::StopLoss,
        trigger_type: TriggerType::PriceBelow,
        trigger_value: stop,
        order_side: Side::Sell,
        order_type: vigil_core::OrderType::Market,
        quantity: qty,
        limit_price: None,
        time_in_force: vigil_core::TimeInForce::Gtc,
        entry_price: None,
        expires_at: None,
    }
}

#[tokio::test]
async fn test_oco_take_profit_fires_and_cancels_stop_in_one_tick() {
    let h = Harness::new();
    h.hold("AAPL", dec!(10), dec!(150));
    let engine = h.engine().await;
    let pair = engine
        .create_oco(OcoRequest {
            symbol: "AAPL".to_string(),
            quantity: dec!(10),
            entry_price: dec!(150),
            stop_loss_price: dec!(140),
            take_profit_price: dec!(160),
            expires_at: None,
        })
        .await
        .unwrap();

    h.broker.set_price("AAPL", dec!(161));
    let summary = engine.run_tick().await;

    assert!(summary.errors.is_empty(), "{:?}", summary.errors);
    assert_eq!(summary.rules_triggered, 1);
    assert_eq!(summary.oco_cancelled, 1);
    assert_eq!(summary.orders_submitted, 1);
    assert_eq!(summary.orders_synced, 1);

    let book = engine.rule_book();
    assert_eq!(book.get(pair.take_profit.id).await.unwrap().status, RuleStatus::Triggered);
    assert_eq!(book.get(pair.stop_loss.id).await.unwrap().status, RuleStatus::Cancelled);

    let executions = engine.rule_executions(pair.take_profit.id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].trigger_price, dec!(161));
    assert!(executions[0].broker_order_id.is_some());

    let sells = h.broker.submitted();
    assert_eq!(sells.len(), 1);
    assert_eq!((sells[0].side, sells[0].quantity), (Side::Sell, dec!(10)));

    // The cancelled leg never fires afterwards
    h.broker.set_price("AAPL", dec!(139));
    let summary = engine.run_tick().await;
    assert_eq!(summary.rules_triggered, 0);
    assert_eq!(h.broker.submitted().len(), 1);
}

#[tokio::test]
async fn test_scaled_exit_plan_runs_to_completion() {
    let h = Harness::new();
    h.hold("AAPL", dec!(100), dec!(100));
    let engine = h.engine().await;
    let plan = engine
        .create_plan(NewPlan {
            symbol: "AAPL".to_string(),
            entry_price: dec!(100),
            total_quantity: dec!(100),
            direction: None,
            targets: vec![
                TargetSpec::new(dec!(5), dec!(50)),
                TargetSpec::new(dec!(10), dec!(30)),
            ],
            trailing: Some(TrailingSpec::new(dec!(15), dec!(2))),
        })
        .await
        .unwrap();

    let mut exits = 0;
    let mut completed = 0;
    for price in [dec!(106), dec!(111), dec!(118), dec!(115.5)] {
        h.broker.set_price("AAPL", price);
        let summary = engine.run_tick().await;
        assert!(summary.errors.is_empty(), "{:?}", summary.errors);
        // Shadow rules never fire on their own
        assert_eq!(summary.rules_triggered, 0);
        exits += summary.plan_exits;
        completed += summary.plans_completed;
    }

    assert_eq!((exits, completed), (3, 1));
    let plan = engine.get_plan(plan.id).await.unwrap();
    assert_eq!(plan.status, PlanStatus::Completed);
    assert_eq!(plan.remaining_quantity, dec!(0));

    let sold: Vec<Decimal> = h.broker.submitted().iter().map(|r| r.quantity).collect();
    assert_eq!(sold, vec![dec!(50), dec!(30), dec!(20)]);
    assert!(h.broker.open_order_ids().is_empty());
}

#[tokio::test]
async fn test_kill_switch_blocks_fires_until_deactivated() {
    let h = Harness::new();
    h.hold("AAPL", dec!(10), dec!(150));
    let engine = h.engine().await;
    let rule = engine.create_rule(stop_loss("AAPL", dec!(10), dec!(145))).await.unwrap();
    engine.activate_kill_switch("manual halt").await.unwrap();

    h.broker.set_price("AAPL", dec!(144));
    let summary = engine.run_tick().await;

    assert_eq!(summary.rules_triggered, 0);
    assert!(summary.errors.iter().any(|e| e.contains("trading_enabled")));
    assert_eq!(engine.rule_book().get(rule.id).await.unwrap().status, RuleStatus::Active);
    assert!(h.broker.submitted().is_empty());
    let executions = engine.rule_executions(rule.id).await.unwrap();
    assert!(executions[0].error.as_deref().is_some_and(|e| e.contains("manual halt")));

    let err = engine
        .submit_market_order("AAPL", Side::Buy, dec!(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Risk(vigil_risk_gate::Error::RiskRejected { .. })));

    engine.deactivate_kill_switch().await.unwrap();
    let summary = engine.run_tick().await;
    assert_eq!(summary.rules_triggered, 1);
    assert_eq!(h.broker.submitted().len(), 1);
}

#[tokio::test]
async fn test_expired_rules_are_swept_before_evaluation() {
    let h = Harness::new();
    h.hold("AAPL", dec!(10), dec!(150));
    let engine = h.engine().await;
    let mut request = stop_loss("AAPL", dec!(10), dec!(145));
    request.expires_at = Some(h.clock.now() + Duration::minutes(5));
    let rule = engine.create_rule(request).await.unwrap();

    h.clock.advance(Duration::minutes(10));
    h.broker.set_price("AAPL", dec!(140));
    let summary = engine.run_tick().await;

    assert_eq!(summary.rules_expired, 1);
    assert_eq!(summary.rules_triggered, 0);
    assert_eq!(engine.rule_book().get(rule.id).await.unwrap().status, RuleStatus::Expired);
}

#[tokio::test]
async fn test_transient_submit_failures_retry_across_ticks() {
    let h = Harness::new();
    h.broker.set_price("AAPL", dec!(50));
    let engine = h.engine().await;
    let order = engine
        .submit_market_order("AAPL", Side::Buy, dec!(5))
        .await
        .unwrap();
    for _ in 0..2 {
        h.broker
            .fail_next_submit(BrokerError::Transient("rate limited".to_string()));
    }

    assert_eq!(engine.run_tick().await.orders_retried, 1);
    h.clock.advance(Duration::seconds(1));
    assert_eq!(engine.run_tick().await.orders_retried, 1);
    h.clock.advance(Duration::seconds(2));
    let summary = engine.run_tick().await;
    assert_eq!(summary.orders_submitted, 1);
    assert_eq!(summary.orders_synced, 1);

    let order = engine.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, QueuedOrderStatus::Filled);
    assert_eq!(order.retry_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_broker_timeout_is_retried() {
    let h = Harness::new();
    let mut config = EngineConfig::default();
    config.broker.timeout_ms = 500;
    let engine = h.engine_with(config).await;
    let order = engine
        .order_queue()
        .enqueue(NewOrder::new(OrderRequest::market("AAPL", Side::Buy, dec!(1))))
        .await
        .unwrap();

    h.broker.set_latency(std::time::Duration::from_secs(2));
    let summary = engine.run_tick().await;

    assert_eq!(summary.orders_retried, 1);
    assert!(summary.errors.iter().any(|e| e.contains("timed out")));
    let order = engine.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, QueuedOrderStatus::Pending);
    assert!(order.last_error.is_some_and(|e| e.contains("timed out")));
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_tick_is_skipped() {
    let h = Harness::new();
    let engine = h.engine().await;
    h.broker.set_latency(std::time::Duration::from_millis(100));

    let (first, second) = tokio::join!(engine.run_tick(), engine.run_tick());

    assert!(!first.skipped);
    assert!(second.skipped);
    assert!(!engine.run_tick().await.skipped);
}

#[tokio::test]
async fn test_bracket_legs_spawn_once_after_fill() {
    let h = Harness::new();
    h.broker.set_price("AAPL", dec!(100));
    let engine = h.engine().await;
    engine
        .submit_bracket_order(BracketOrder {
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            quantity: dec!(10),
            entry_limit_price: None,
            stop_loss_price: dec!(95),
            take_profit_price: dec!(110),
        })
        .await
        .unwrap();

    let summary = engine.run_tick().await;
    assert_eq!(summary.brackets_spawned, 1);
    let legs = engine.rule_book().list_active_rules().await.unwrap();
    assert_eq!(legs.len(), 2);
    assert!(legs.iter().all(|r| r.rule_type == RuleType::Oco && r.order_side == Side::Sell));

    assert_eq!(engine.run_tick().await.brackets_spawned, 0);

    h.broker.set_price("AAPL", dec!(111));
    let summary = engine.run_tick().await;
    assert_eq!(summary.rules_triggered, 1);
    assert_eq!(summary.oco_cancelled, 1);
}

fn bracket(quantity: Decimal) -> BracketOrder {
    BracketOrder {
        symbol: "AAPL".to_string(),
        side: Side::Buy,
        quantity,
        entry_limit_price: None,
        stop_loss_price: dec!(95),
        take_profit_price: dec!(110),
    }
}

#[tokio::test]
async fn test_bracket_filled_past_target_fails_once() {
    let h = Harness::new();
    // Market entry slips past the take profit
    h.broker.set_price("AAPL", dec!(112));
    let engine = h.engine().await;
    let entry = engine.submit_bracket_order(bracket(dec!(10))).await.unwrap();

    let summary = engine.run_tick().await;
    assert_eq!(summary.brackets_spawned, 0);
    assert_eq!(summary.brackets_failed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].contains("outside stop"));

    let summary = engine.run_tick().await;
    assert_eq!(summary.brackets_failed, 0);
    assert!(summary.errors.is_empty());
    assert!(engine.rule_book().list_active_rules().await.unwrap().is_empty());

    let entry = engine.get_order(entry.id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueuedOrderStatus::Filled);
}

#[tokio::test]
async fn test_bracket_spawns_for_partial_fill_then_cancel() {
    let h = Harness::new();
    h.broker.set_price("AAPL", dec!(100));
    h.broker.set_auto_fill(false);
    let engine = h.engine().await;
    let entry = engine.submit_bracket_order(bracket(dec!(10))).await.unwrap();

    engine.run_tick().await;
    let broker_id = engine
        .get_order(entry.id)
        .await
        .unwrap()
        .unwrap()
        .broker_order_id
        .unwrap();
    h.broker.fill_order(&broker_id, dec!(4), dec!(100)).unwrap();

    let summary = engine.run_tick().await;
    assert_eq!(summary.brackets_spawned, 0);
    let cancelled = engine.cancel_order(entry.id).await.unwrap();
    assert_eq!(cancelled.status, QueuedOrderStatus::Cancelled);
    assert_eq!(cancelled.filled_qty, dec!(4));

    let summary = engine.run_tick().await;
    assert_eq!(summary.brackets_spawned, 1);
    let legs = engine.rule_book().list_active_rules().await.unwrap();
    assert_eq!(legs.len(), 2);
    assert!(legs.iter().all(|r| r.quantity == dec!(4)));
    assert_eq!(engine.run_tick().await.brackets_spawned, 0);
}

#[tokio::test]
async fn test_entries_are_sized_by_regime_and_exits_are_not() {
    let h = Harness::new();
    h.regime.set_regime("AAPL", Regime::Chop);
    h.hold("AAPL", dec!(100), dec!(50));
    let engine = h.engine().await;

    let entry = TradeIntent::from_request(
        &OrderRequest::market("AAPL", Side::Buy, dec!(100)),
        IntentSource::Manual,
    );
    let entry_id = engine.submit_intent(entry).await.unwrap();
    let exit = TradeIntent::market_exit("AAPL", Side::Sell, dec!(100), IntentSource::Manual);
    let exit_id = engine.submit_intent(exit).await.unwrap();

    let entry = engine.get_order(entry_id).await.unwrap().unwrap();
    let exit = engine.get_order(exit_id).await.unwrap().unwrap();
    assert_eq!(entry.request.quantity, dec!(70));
    assert_eq!(exit.request.quantity, dec!(100));

    h.regime.set_regime("AAPL", Regime::Untradeable);
    let blocked = TradeIntent::from_request(
        &OrderRequest::market("AAPL", Side::Buy, dec!(1)),
        IntentSource::Manual,
    );
    let err = engine.submit_intent(blocked).await.unwrap_err();
    assert!(err.to_string().contains("regime_check"));
}

#[tokio::test]
async fn test_kill_switch_persists_across_engine_restart() {
    let h = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("risk.json");
    let parts = || EngineParts {
        risk_config: Arc::new(JsonRiskConfigRepository::new(&path)),
        ..h.parts()
    };

    let engine = Engine::init(parts(), EngineConfig::default()).await.unwrap();
    engine.activate_kill_switch("end of day").await.unwrap();
    drop(engine);

    let restarted = Engine::init(parts(), EngineConfig::default()).await.unwrap();
    assert!(restarted.is_kill_switch_active().await.unwrap());
    let config = restarted.risk_config().await.unwrap();
    assert_eq!(config.kill_switch_reason.as_deref(), Some("end of day"));
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_ticks_until_shutdown() {
    let h = Harness::new();
    let mut config = EngineConfig::default();
    config.monitor.tick_interval_ms = 1_000;
    let engine = h.engine_with(config).await;
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(run_scheduled(engine, rx));
    tokio::time::sleep(std::time::Duration::from_millis(3_500)).await;
    tx.send(true).unwrap();
    let ticks = handle.await.unwrap();

    assert!(ticks >= 3, "only {ticks} ticks ran");
}
