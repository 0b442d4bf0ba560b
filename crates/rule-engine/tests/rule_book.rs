//! Integration test: rule book against the in-memory store

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use vigil_clock::ManualClock;
use vigil_core::{
    BrokerPosition, OrderId, OrderType, Quote, RuleStatus, RuleType, Side, TimeInForce,
    TradeIntent, TriggerType,
};
use vigil_ports::{Clock, IntentError, IntentSink};
use vigil_rules::{Error, ExitLeg, NewRule, OcoRequest, QuickSetup, RuleBook};
use vigil_store::MemoryStore;

/// Sink that records intents and optionally refuses them
#[derive(Default)]
struct RecordingSink {
    intents: Mutex<Vec<TradeIntent>>,
    reject: Mutex<Option<String>>,
}

impl RecordingSink {
    fn intents(&self) -> Vec<TradeIntent> {
        self.intents.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntentSink for RecordingSink {
    async fn submit_intent(&self, intent: TradeIntent) -> Result<OrderId, IntentError> {
        if let Some(reason) = self.reject.lock().unwrap().clone() {
            return Err(IntentError::Rejected(reason));
        }
        self.intents.lock().unwrap().push(intent);
        Ok(Uuid::new_v4())
    }
}

fn setup() -> (RuleBook, Arc<ManualClock>) {
    let store = MemoryStore::new();
    let clock = ManualClock::new();
    let book = RuleBook::new(
        Arc::new(store.rules.clone()),
        Arc::new(store.executions.clone()),
        clock.clone(),
    );
    (book, clock)
}

fn oco_request() -> OcoRequest {
    OcoRequest {
        symbol: "AAPL".to_string(),
        quantity: dec!(10),
        entry_price: dec!(150),
        stop_loss_price: dec!(140),
        take_profit_price: dec!(160),
        expires_at: None,
    }
}

fn quote(price: Decimal) -> Quote {
    Quote::new("AAPL", price, price, price)
}

#[tokio::test]
async fn test_take_profit_fires_and_cancels_stop() {
    let _ = env_logger::try_init();
    let (book, _clock) = setup();
    let sink = RecordingSink::default();
    let pair = book.create_oco(oco_request()).await.unwrap();

    let evaluation = book.evaluate_symbol(&quote(dec!(161)), None, &sink).await.unwrap();

    assert_eq!(evaluation.fired.len(), 1);
    assert_eq!(evaluation.fired[0].rule_id, pair.take_profit.id);
    assert_eq!(evaluation.cancelled_siblings, 1);
    assert!(evaluation.errors.is_empty());

    let take_profit = book.get(pair.take_profit.id).await.unwrap();
    let stop_loss = book.get(pair.stop_loss.id).await.unwrap();
    assert_eq!(take_profit.status, RuleStatus::Triggered);
    assert!(take_profit.triggered_at.is_some());
    assert_eq!(stop_loss.status, RuleStatus::Cancelled);

    let intents = sink.intents();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].side, Side::Sell);
    assert_eq!(intents[0].quantity, dec!(10));
    assert!(intents[0].reduces_position);

    let history = book.executions(pair.take_profit.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].trigger_price, dec!(161));
    assert_eq!(history[0].order_id, Some(evaluation.fired[0].order_id));
}

#[tokio::test]
async fn test_refused_fire_leaves_rule_active() {
    let (book, _clock) = setup();
    let sink = RecordingSink::default();
    *sink.reject.lock().unwrap() = Some("trading_enabled: kill switch active".to_string());
    let pair = book.create_oco(oco_request()).await.unwrap();

    let evaluation = book.evaluate_symbol(&quote(dec!(139)), None, &sink).await.unwrap();

    assert!(evaluation.fired.is_empty());
    assert_eq!(evaluation.errors.len(), 1);
    assert!(evaluation.errors[0].contains("kill switch"));
    assert_eq!(book.get(pair.stop_loss.id).await.unwrap().status, RuleStatus::Active);

    let history = book.executions(pair.stop_loss.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].error.as_deref().is_some_and(|e| e.contains("kill switch")));

    // Next tick, the gate lets it through
    *sink.reject.lock().unwrap() = None;
    let evaluation = book.evaluate_symbol(&quote(dec!(139)), None, &sink).await.unwrap();
    assert_eq!(evaluation.fired.len(), 1);
    assert_eq!(book.get(pair.take_profit.id).await.unwrap().status, RuleStatus::Cancelled);
}

#[tokio::test]
async fn test_repeated_refusal_is_recorded_once() {
    let (book, _clock) = setup();
    let sink = RecordingSink::default();
    *sink.reject.lock().unwrap() = Some("max_position_size: 10 over limit".to_string());
    let pair = book.create_oco(oco_request()).await.unwrap();

    for _ in 0..3 {
        let evaluation = book.evaluate_symbol(&quote(dec!(139)), None, &sink).await.unwrap();
        assert_eq!(evaluation.errors.len(), 1);
    }
    assert_eq!(book.executions(pair.stop_loss.id).await.unwrap().len(), 1);

    // A different reason is a new record
    *sink.reject.lock().unwrap() = Some("trading_enabled: kill switch active".to_string());
    book.evaluate_symbol(&quote(dec!(139)), None, &sink).await.unwrap();
    let history = book.executions(pair.stop_loss.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[1].error.as_deref().is_some_and(|e| e.contains("kill switch")));
}

#[tokio::test]
async fn test_terminal_rules_cannot_be_triggered() {
    let (book, _clock) = setup();
    let pair = book.create_oco(oco_request()).await.unwrap();

    book.cancel_rule(pair.stop_loss.id).await.unwrap();
    let result = book.mark_triggered(pair.stop_loss.id).await;

    assert!(matches!(
        result,
        Err(Error::InvalidTransition {
            from: RuleStatus::Cancelled,
            to: RuleStatus::Triggered,
            ..
        })
    ));
    assert!(matches!(
        book.get(Uuid::new_v4()).await,
        Err(Error::RuleNotFound(_))
    ));
}

#[tokio::test]
async fn test_expired_rules_are_swept_not_fired() {
    let (book, clock) = setup();
    let sink = RecordingSink::default();
    let rule = book
        .create_rule(
            NewRule {
                symbol: "AAPL".to_string(),
                name: Some("dip buy".to_string()),
                rule_type: RuleType::LimitOrder,
                trigger_type: TriggerType::PriceBelow,
                trigger_value: dec!(100),
                order_side: Side::Buy,
                order_type: OrderType::Limit,
                quantity: dec!(5),
                limit_price: Some(dec!(99.5)),
                time_in_force: TimeInForce::Day,
                entry_price: None,
                expires_at: Some(clock.now() + Duration::hours(1)),
            },
            None,
        )
        .await
        .unwrap();

    clock.advance(Duration::hours(2));
    let evaluation = book.evaluate_symbol(&quote(dec!(90)), None, &sink).await.unwrap();
    assert!(evaluation.fired.is_empty());

    let swept = book.sweep_expired().await.unwrap();
    assert_eq!(swept, vec![rule.id]);
    assert_eq!(book.get(rule.id).await.unwrap().status, RuleStatus::Expired);
    assert!(book.active_symbols().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_entry_rule_goes_through_regime_gate() {
    let (book, _clock) = setup();
    let sink = RecordingSink::default();
    book.create_rule(
        NewRule {
            symbol: "MSFT".to_string(),
            name: None,
            rule_type: RuleType::LimitOrder,
            trigger_type: TriggerType::PriceBelow,
            trigger_value: dec!(300),
            order_side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: dec!(2),
            limit_price: Some(dec!(299)),
            time_in_force: TimeInForce::Gtc,
            entry_price: None,
            expires_at: None,
        },
        None,
    )
    .await
    .unwrap();

    let quote = Quote::new("MSFT", dec!(298), dec!(298), dec!(298));
    let evaluation = book.evaluate_symbol(&quote, None, &sink).await.unwrap();

    assert_eq!(evaluation.fired.len(), 1);
    let intent = &sink.intents()[0];
    assert_eq!(intent.order_type, OrderType::Limit);
    assert_eq!(intent.limit_price, Some(dec!(299)));
    assert!(!intent.reduces_position);
    assert!(!intent.skip_regime_check);
}

#[tokio::test]
async fn test_listing_annotates_distance_without_side_effects() {
    let (book, _clock) = setup();
    let position = BrokerPosition::new("AAPL", dec!(10), dec!(150), dec!(145));
    let rules = book
        .create_quick_setup(
            QuickSetup {
                symbol: "AAPL".to_string(),
                quantity: None,
                entry_price: None,
                direction: None,
                stop_loss: Some(ExitLeg::percent(dec!(5))),
                take_profit: None,
                trailing_stop_percent: None,
            },
            Some(&position),
        )
        .await
        .unwrap();

    let prices = HashMap::from([("AAPL".to_string(), dec!(145))]);
    let views = book.list_active(&prices, &[position]).await.unwrap();

    assert_eq!(views.len(), 1);
    let view = &views[0];
    assert_eq!(view.rule.id, rules[0].id);
    assert_eq!(view.current_price, Some(dec!(145)));
    assert_eq!(view.trigger_price, Some(dec!(142.5)));
    assert_eq!(view.distance_to_trigger, Some(dec!(-2.5)));
    assert_eq!(book.get(rules[0].id).await.unwrap(), rules[0]);
}

#[tokio::test]
async fn test_trailing_stop_ratchets_then_fires() {
    let (book, _clock) = setup();
    let sink = RecordingSink::default();
    let rules = book
        .create_quick_setup(
            QuickSetup {
                symbol: "AAPL".to_string(),
                quantity: Some(dec!(10)),
                entry_price: Some(dec!(100)),
                direction: None,
                stop_loss: None,
                take_profit: None,
                trailing_stop_percent: Some(dec!(5)),
            },
            None,
        )
        .await
        .unwrap();
    let trail = &rules[0];
    assert_eq!(trail.oco_group_id, None);

    assert_eq!(book.ratchet_trailing("AAPL", dec!(120)).await.unwrap(), 1);
    assert_eq!(book.ratchet_trailing("AAPL", dec!(115)).await.unwrap(), 0);

    let quiet = book.evaluate_symbol(&quote(dec!(115)), None, &sink).await.unwrap();
    assert!(quiet.fired.is_empty());

    let fired = book.evaluate_symbol(&quote(dec!(114)), None, &sink).await.unwrap();
    assert_eq!(fired.fired.len(), 1);
    assert_eq!(book.get(trail.id).await.unwrap().high_water_mark, Some(dec!(120)));
}

#[tokio::test]
async fn test_broker_id_backfill_once() {
    let (book, _clock) = setup();
    let sink = RecordingSink::default();
    let pair = book.create_oco(oco_request()).await.unwrap();
    let evaluation = book.evaluate_symbol(&quote(dec!(161)), None, &sink).await.unwrap();
    let order_id = evaluation.fired[0].order_id;

    assert!(book.record_broker_order(order_id, "paper-7").await.unwrap());
    assert!(!book.record_broker_order(order_id, "paper-8").await.unwrap());
    assert!(!book.record_broker_order(Uuid::new_v4(), "paper-9").await.unwrap());

    let history = book.executions(pair.take_profit.id).await.unwrap();
    assert_eq!(history[0].broker_order_id.as_deref(), Some("paper-7"));
}
