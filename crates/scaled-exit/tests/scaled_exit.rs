//! Integration test: scaled exit plans against the in-memory store

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use vigil_clock::ManualClock;
use vigil_core::{
    IntentSource, OrderId, PlanEventKind, PlanStatus, RuleStatus, RuleType, Side, TradeIntent,
};
use vigil_ports::{IntentError, IntentSink, PlanRepository, RuleRepository};
use vigil_scaled_exit::{
    Error, NewPlan, PlanUpdate, ScaledExitPlanner, TargetSpec, TrailingSpec,
};
use vigil_store::MemoryStore;

#[derive(Default)]
struct RecordingSink {
    intents: Mutex<Vec<TradeIntent>>,
    refuse: Mutex<bool>,
}

#[async_trait]
impl IntentSink for RecordingSink {
    async fn submit_intent(&self, intent: TradeIntent) -> Result<OrderId, IntentError> {
        if *self.refuse.lock().unwrap() {
            return Err(IntentError::Failed("queue unavailable".to_string()));
        }
        self.intents.lock().unwrap().push(intent);
        Ok(Uuid::new_v4())
    }
}

fn setup() -> (ScaledExitPlanner, MemoryStore) {
    let store = MemoryStore::new();
    let planner = ScaledExitPlanner::new(
        Arc::new(store.plans.clone()),
        Arc::new(store.rules.clone()),
        ManualClock::new(),
    );
    (planner, store)
}

fn example_plan() -> NewPlan {
    NewPlan {
        symbol: "AAPL".to_string(),
        entry_price: dec!(100),
        total_quantity: dec!(100),
        direction: None,
        targets: vec![
            TargetSpec::new(dec!(5), dec!(50)),
            TargetSpec::new(dec!(10), dec!(30)),
        ],
        trailing: Some(TrailingSpec::new(dec!(15), dec!(2))),
    }
}

#[tokio::test]
async fn test_targets_then_trailing_leg_complete_the_plan() {
    let _ = env_logger::try_init();
    let (planner, store) = setup();
    let sink = RecordingSink::default();
    let plan = planner.create_plan(example_plan()).await.unwrap();

    let mut remaining = Vec::new();
    for price in [dec!(106), dec!(111), dec!(118), dec!(115.5)] {
        planner.on_tick(plan.id, price, &sink).await.unwrap();
        remaining.push(planner.get_plan(plan.id).await.unwrap().remaining_quantity);
    }
    assert_eq!(remaining, vec![dec!(50), dec!(20), dec!(20), dec!(0)]);

    let intents = sink.intents.lock().unwrap().clone();
    let sold: Vec<Decimal> = intents.iter().map(|i| i.quantity).collect();
    assert_eq!(sold, vec![dec!(50), dec!(30), dec!(20)]);
    assert!(intents.iter().all(|i| i.side == Side::Sell && i.reduces_position));
    assert!(matches!(
        &intents[2].source,
        IntentSource::ScaledExit { leg, .. } if leg == "trailing"
    ));

    let done = planner.get_plan(plan.id).await.unwrap();
    assert_eq!(done.status, PlanStatus::Completed);
    assert!(done.completed_at.is_some());
    assert!(done.targets.iter().all(|t| t.triggered));
    let trailing = done.trailing.unwrap();
    assert!(trailing.activated && trailing.triggered);
    assert_eq!(trailing.high_water_mark, Some(dec!(118)));

    let kinds: Vec<PlanEventKind> = planner
        .plan_events(plan.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            PlanEventKind::Created,
            PlanEventKind::TargetTriggered { index: 0 },
            PlanEventKind::TargetTriggered { index: 1 },
            PlanEventKind::TrailingActivated,
            PlanEventKind::TrailingTriggered,
            PlanEventKind::Completed,
        ]
    );

    let events = store.plans.events(plan.id).await.unwrap();
    let trailing_event = events
        .iter()
        .find(|e| e.kind == PlanEventKind::TrailingTriggered)
        .unwrap();
    assert!(trailing_event.message.contains("115.64"));
}

#[tokio::test]
async fn test_shadow_rules_follow_targets() {
    let (planner, store) = setup();
    let sink = RecordingSink::default();
    let plan = planner.create_plan(example_plan()).await.unwrap();

    let shadows = store.rules.list_by_plan(plan.id).await.unwrap();
    assert_eq!(shadows.len(), 2);
    assert!(shadows.iter().all(|r| r.rule_type == RuleType::TakeProfit));
    let mut quantities: Vec<Decimal> = shadows.iter().map(|r| r.quantity).collect();
    quantities.sort();
    assert_eq!(quantities, vec![dec!(30), dec!(50)]);

    planner.on_tick(plan.id, dec!(106), &sink).await.unwrap();
    let first = store.rules.get(plan.targets[0].rule_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(first.status, RuleStatus::Triggered);

    planner.cancel_plan(plan.id).await.unwrap();
    let second = store.rules.get(plan.targets[1].rule_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(second.status, RuleStatus::Cancelled);
    assert!(matches!(
        planner.cancel_plan(plan.id).await,
        Err(Error::NotActive { status: PlanStatus::Cancelled, .. })
    ));
}

#[tokio::test]
async fn test_invalid_plan_stores_nothing() {
    let (planner, store) = setup();
    let mut request = example_plan();
    request.targets[1].quantity_percent = dec!(60);

    assert!(matches!(
        planner.create_plan(request).await,
        Err(Error::Validation(_))
    ));
    assert!(store.plans.list(None).await.unwrap().is_empty());
    assert!(
        store
            .rules
            .list_by_status(RuleStatus::Active)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_refused_exit_is_retried_next_tick() {
    let (planner, _store) = setup();
    let sink = RecordingSink::default();
    let plan = planner.create_plan(example_plan()).await.unwrap();

    *sink.refuse.lock().unwrap() = true;
    let outcome = planner.on_tick(plan.id, dec!(106), &sink).await.unwrap();
    assert!(outcome.exits.is_empty());
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(
        planner.get_plan(plan.id).await.unwrap().remaining_quantity,
        dec!(100)
    );

    *sink.refuse.lock().unwrap() = false;
    let outcome = planner.on_tick(plan.id, dec!(106), &sink).await.unwrap();
    assert_eq!(outcome.exits.len(), 1);
    assert_eq!(outcome.exits[0].quantity, dec!(50));
}

#[tokio::test]
async fn test_targets_alone_complete_plan() {
    let (planner, _store) = setup();
    let sink = RecordingSink::default();
    let plan = planner
        .create_plan(NewPlan {
            symbol: "MSFT".to_string(),
            entry_price: dec!(200),
            total_quantity: dec!(10),
            direction: None,
            targets: vec![
                TargetSpec::new(dec!(2), dec!(50)),
                TargetSpec::new(dec!(4), dec!(50)),
            ],
            trailing: None,
        })
        .await
        .unwrap();

    let outcome = planner.on_tick(plan.id, dec!(210), &sink).await.unwrap();

    assert_eq!(outcome.exits.len(), 2);
    assert!(outcome.completed);
    let done = planner.get_plan(plan.id).await.unwrap();
    assert_eq!(done.status, PlanStatus::Completed);
    assert_eq!(done.remaining_quantity, dec!(0));

    // A completed plan never sells again
    let outcome = planner.on_tick(plan.id, dec!(250), &sink).await.unwrap();
    assert!(outcome.exits.is_empty());
}

#[tokio::test]
async fn test_update_adds_trailing_leg() {
    let (planner, _store) = setup();
    let mut request = example_plan();
    request.trailing = None;
    let plan = planner.create_plan(request).await.unwrap();

    let updated = planner
        .update_plan(
            plan.id,
            PlanUpdate {
                trailing: Some(TrailingSpec::new(dec!(12), dec!(1))),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.trailing.unwrap().activation_percent, dec!(12));
    let events = planner.plan_events(plan.id).await.unwrap();
    assert_eq!(events.last().unwrap().kind, PlanEventKind::Updated);
    assert!(matches!(
        planner.get_plan(Uuid::new_v4()).await,
        Err(Error::PlanNotFound(_))
    ));
}
