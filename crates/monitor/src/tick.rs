use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use vigil_core::{BrokerPosition, PlanStatus, Quote, QueuedOrder, ScaledExitPlan};
use vigil_order_queue::BracketLegs;
use vigil_rules::OcoRequest;

use crate::engine::Engine;

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    /// Another tick was in flight; nothing was done
    pub skipped: bool,
    pub rules_expired: usize,
    pub rules_triggered: usize,
    pub oco_cancelled: usize,
    pub trailing_ratcheted: usize,
    pub plan_exits: usize,
    pub plans_completed: usize,
    pub orders_submitted: usize,
    pub orders_retried: usize,
    pub orders_failed: usize,
    pub orders_synced: usize,
    pub sync_mismatches: usize,
    pub brackets_spawned: usize,
    /// Bracket entries whose legs could not be built; reported once each
    pub brackets_failed: usize,
    /// Failures collected from every phase; none of them stop the tick
    pub errors: Vec<String>,
}

impl Engine {
    /// Run one monitor pass
    ///
    /// Returns immediately with `skipped` set if a tick is already running.
    pub async fn run_tick(&self) -> TickSummary {
        let Ok(_guard) = self.inner.tick_lock.try_lock() else {
            warn!("[MONITOR] Previous tick still running, skipping");
            return TickSummary {
                skipped: true,
                ..Default::default()
            };
        };
        let timer = Instant::now();
        let mut summary = TickSummary {
            started_at: Some(self.inner.clock.now()),
            ..Default::default()
        };

        self.expire_rules(&mut summary).await;
        let positions = self.fetch_positions(&mut summary).await;
        let plans = match self.inner.planner.list_plans(Some(PlanStatus::Active)).await {
            Ok(plans) => plans,
            Err(e) => {
                summary.errors.push(format!("plans: {e}"));
                Vec::new()
            }
        };
        let prices = self.fetch_prices(&plans, &mut summary).await;

        self.evaluate_rules(&prices, &positions, &mut summary).await;
        self.evaluate_plans(&plans, &prices, &mut summary).await;
        self.drain_queue(&mut summary).await;
        self.sync_orders(&mut summary).await;
        self.spawn_brackets(&mut summary).await;

        summary.duration_ms = u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX);
        if summary.errors.is_empty() {
            debug!(
                "[MONITOR] Tick done in {} ms: {} triggered, {} plan exits, {} submitted",
                summary.duration_ms,
                summary.rules_triggered,
                summary.plan_exits,
                summary.orders_submitted
            );
        } else {
            info!(
                "[MONITOR] Tick done in {} ms with {} error(s): {}",
                summary.duration_ms,
                summary.errors.len(),
                summary.errors.join("; ")
            );
        }
        summary
    }

    async fn expire_rules(&self, summary: &mut TickSummary) {
        match self.inner.rules.sweep_expired().await {
            Ok(expired) => summary.rules_expired = expired.len(),
            Err(e) => summary.errors.push(format!("expiry sweep: {e}")),
        }
    }

    async fn fetch_positions(&self, summary: &mut TickSummary) -> Vec<BrokerPosition> {
        match self.inner.broker.get_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                summary.errors.push(format!("positions: {e}"));
                Vec::new()
            }
        }
    }

    /// Latest price of every symbol with an active rule or plan
    async fn fetch_prices(
        &self,
        plans: &[ScaledExitPlan],
        summary: &mut TickSummary,
    ) -> HashMap<String, Quote> {
        let mut symbols = match self.inner.rules.active_symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                summary.errors.push(format!("rules: {e}"));
                Vec::new()
            }
        };
        symbols.extend(plans.iter().map(|p| p.symbol.clone()));
        symbols.sort();
        symbols.dedup();

        let quotes = join_all(
            symbols
                .iter()
                .map(|symbol| self.inner.quotes.get_latest_quote(symbol)),
        )
        .await;

        let mut prices = HashMap::new();
        for (symbol, quote) in symbols.into_iter().zip(quotes) {
            match quote {
                Ok(quote) => {
                    prices.insert(symbol, quote);
                }
                Err(e) => summary.errors.push(format!("quote {symbol}: {e}")),
            }
        }
        prices
    }

    async fn evaluate_rules(
        &self,
        prices: &HashMap<String, Quote>,
        positions: &[BrokerPosition],
        summary: &mut TickSummary,
    ) {
        let mut symbols: Vec<&String> = prices.keys().collect();
        symbols.sort();
        for symbol in symbols {
            let quote = &prices[symbol];
            let position = positions
                .iter()
                .find(|p| p.symbol.eq_ignore_ascii_case(symbol));

            if let Some(price) = quote.reference_price() {
                match self.inner.rules.ratchet_trailing(symbol, price).await {
                    Ok(moved) => summary.trailing_ratcheted += moved,
                    Err(e) => summary.errors.push(format!("trailing {symbol}: {e}")),
                }
            }

            match self.inner.rules.evaluate_symbol(quote, position, self).await {
                Ok(evaluation) => {
                    summary.rules_triggered += evaluation.fired.len();
                    summary.oco_cancelled += evaluation.cancelled_siblings;
                    summary.errors.extend(evaluation.errors);
                }
                Err(e) => summary.errors.push(format!("rules {symbol}: {e}")),
            }
        }
    }

    async fn evaluate_plans(
        &self,
        plans: &[ScaledExitPlan],
        prices: &HashMap<String, Quote>,
        summary: &mut TickSummary,
    ) {
        for plan in plans {
            let Some(price) = prices.get(&plan.symbol).and_then(|q| q.reference_price()) else {
                continue;
            };
            match self.inner.planner.on_tick(plan.id, price, self).await {
                Ok(outcome) => {
                    summary.plan_exits += outcome.exits.len();
                    if outcome.completed {
                        summary.plans_completed += 1;
                    }
                    summary.errors.extend(outcome.errors);
                }
                Err(e) => summary.errors.push(format!("plan {}: {e}", plan.id)),
            }
        }
    }

    async fn drain_queue(&self, summary: &mut TickSummary) {
        let report = match self.inner.queue.process_queue().await {
            Ok(report) => report,
            Err(e) => {
                summary.errors.push(format!("queue: {e}"));
                return;
            }
        };
        summary.orders_submitted = report.submitted.len();
        summary.orders_retried = report.retried.len();
        summary.orders_failed = report.failed.len();
        summary.errors.extend(report.errors);

        for (order_id, broker_order_id) in &report.submitted {
            if let Err(e) = self
                .inner
                .rules
                .record_broker_order(*order_id, broker_order_id)
                .await
            {
                summary.errors.push(format!("execution {order_id}: {e}"));
            }
        }
    }

    async fn sync_orders(&self, summary: &mut TickSummary) {
        match self.inner.queue.sync_order_statuses().await {
            Ok(report) => {
                summary.orders_synced = report.updated.len();
                summary.sync_mismatches = report.mismatches.len();
                summary.errors.extend(report.errors);
            }
            Err(e) => summary.errors.push(format!("sync: {e}")),
        }
    }

    /// Turn closed bracket entries into OCO exit pairs, once each
    ///
    /// An entry whose legs cannot be built is marked failed and reported in
    /// this tick only.
    async fn spawn_brackets(&self, summary: &mut TickSummary) {
        for entry in self.inner.queue.brackets_awaiting_spawn().await {
            let Some(legs) = BracketLegs::from_order(&entry) else {
                continue;
            };
            match self.spawn_bracket(&entry, &legs).await {
                Ok(()) => summary.brackets_spawned += 1,
                Err(BracketFailure::Invalid(reason)) => {
                    error!(
                        "[MONITOR] Bracket {} left without exit legs: {reason}",
                        entry.id
                    );
                    summary.brackets_failed += 1;
                    summary.errors.push(format!("bracket {}: {reason}", entry.id));
                    if let Err(e) = self.inner.queue.mark_bracket_failed(entry.id, &reason).await {
                        summary.errors.push(format!("bracket {}: {e}", entry.id));
                    }
                }
                Err(BracketFailure::Other(e)) => {
                    summary.errors.push(format!("bracket {}: {e}", entry.id));
                }
            }
        }
    }

    async fn spawn_bracket(
        &self,
        entry: &QueuedOrder,
        legs: &BracketLegs,
    ) -> std::result::Result<(), BracketFailure> {
        let side = entry.request.side;
        let Some(entry_price) = entry.avg_fill_price.or(entry.request.limit_price) else {
            return Err(BracketFailure::Invalid("entry has no fill price".to_string()));
        };
        if !legs.brackets(side, entry_price) {
            return Err(BracketFailure::Invalid(format!(
                "{} entry filled at {entry_price}, outside stop {} and target {}",
                side.as_str(),
                legs.stop_loss_price,
                legs.take_profit_price
            )));
        }

        let pair = self
            .inner
            .rules
            .create_oco(OcoRequest {
                symbol: entry.request.symbol.clone(),
                quantity: entry.filled_qty,
                entry_price,
                stop_loss_price: legs.stop_loss_price,
                take_profit_price: legs.take_profit_price,
                expires_at: None,
            })
            .await
            .map_err(|e| match e {
                vigil_rules::Error::Validation(reason) => BracketFailure::Invalid(reason),
                other => BracketFailure::Other(other.into()),
            })?;
        self.inner
            .queue
            .mark_bracket_spawned(entry.id)
            .await
            .map_err(|e| BracketFailure::Other(e.into()))?;
        info!(
            "[MONITOR] Bracket {} closed with {} filled, spawned OCO group {}",
            entry.id, entry.filled_qty, pair.group_id
        );
        Ok(())
    }
}

enum BracketFailure {
    /// The legs can never be built for this entry
    Invalid(String),
    Other(crate::Error),
}
