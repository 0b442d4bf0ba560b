//! Paper brokerage
//!
//! Keeps orders, positions and last prices in memory. Market orders fill
//! immediately at the last price; limit and stop orders rest until a price
//! update crosses them.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil_core::{
    BrokerOrder, BrokerOrderStatus, BrokerPosition, OrderRequest, OrderType, Quote, Side,
};
use vigil_ports::{Broker, BrokerError, MarketDataError, QuoteSource};

/// A resting or closed order held by the paper broker
#[derive(Debug, Clone)]
struct PaperOrder {
    request: OrderRequest,
    record: BrokerOrder,
}

/// In-memory brokerage and quote source
pub struct PaperBroker {
    quotes: Arc<DashMap<String, Quote>>,
    orders: Arc<DashMap<String, PaperOrder>>,
    positions: Arc<DashMap<String, BrokerPosition>>,
    /// Failures returned by upcoming `submit_order` calls, oldest first
    scripted_failures: Arc<Mutex<VecDeque<BrokerError>>>,
    /// Failures returned by upcoming `cancel_order` calls, oldest first
    scripted_cancel_failures: Arc<Mutex<VecDeque<BrokerError>>>,
    /// Every request received, in arrival order
    submitted: Arc<Mutex<Vec<OrderRequest>>>,
    failing_quotes: Arc<DashSet<String>>,
    positions_unavailable: Arc<AtomicBool>,
    auto_fill: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
    next_id: Arc<AtomicU64>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            quotes: Arc::new(DashMap::new()),
            orders: Arc::new(DashMap::new()),
            positions: Arc::new(DashMap::new()),
            scripted_failures: Arc::new(Mutex::new(VecDeque::new())),
            scripted_cancel_failures: Arc::new(Mutex::new(VecDeque::new())),
            submitted: Arc::new(Mutex::new(Vec::new())),
            failing_quotes: Arc::new(DashSet::new()),
            positions_unavailable: Arc::new(AtomicBool::new(false)),
            auto_fill: Arc::new(AtomicBool::new(true)),
            latency_ms: Arc::new(AtomicU64::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Set the last price of a symbol and fill any resting order it crosses
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.quotes
            .insert(symbol.to_string(), Quote::new(symbol, price, price, price));
        if let Some(mut position) = self.positions.get_mut(symbol) {
            position.current_price = price;
        }
        if self.auto_fill.load(Ordering::SeqCst) {
            self.fill_crossed(symbol, price);
        }
    }

    /// Set a full quote without touching resting orders
    pub fn set_quote(&self, quote: Quote) {
        self.quotes.insert(quote.symbol.clone(), quote);
    }

    /// Replace the position held in a symbol
    pub fn set_position(&self, position: BrokerPosition) {
        self.positions.insert(position.symbol.clone(), position);
    }

    /// Make the next `submit_order` call fail with `error`
    pub fn fail_next_submit(&self, error: BrokerError) {
        lock(&self.scripted_failures).push_back(error);
    }

    /// Make the next `cancel_order` call fail with `error`
    pub fn fail_next_cancel(&self, error: BrokerError) {
        lock(&self.scripted_cancel_failures).push_back(error);
    }

    /// Make quote lookups for `symbol` fail until cleared
    pub fn fail_quotes(&self, symbol: &str, failing: bool) {
        if failing {
            self.failing_quotes.insert(symbol.to_string());
        } else {
            self.failing_quotes.remove(symbol);
        }
    }

    /// Make `get_positions` fail until cleared
    pub fn fail_positions(&self, failing: bool) {
        self.positions_unavailable.store(failing, Ordering::SeqCst);
    }

    /// Disable automatic fills; orders then stay accepted until `fill_order`
    pub fn set_auto_fill(&self, enabled: bool) {
        self.auto_fill.store(enabled, Ordering::SeqCst);
    }

    /// Delay every broker call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fill (part of) a working order
    pub fn fill_order(
        &self,
        broker_order_id: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<BrokerOrder, BrokerError> {
        let mut entry = self
            .orders
            .get_mut(broker_order_id)
            .ok_or_else(|| BrokerError::NotFound(broker_order_id.to_string()))?;
        if entry.record.status.is_terminal() {
            return Err(BrokerError::AlreadyClosed(broker_order_id.to_string()));
        }
        let remaining = entry.request.quantity - entry.record.filled_qty;
        let quantity = quantity.min(remaining);
        let (symbol, side) = (entry.request.symbol.clone(), entry.request.side);

        let previous = entry.record.filled_qty;
        let filled = previous + quantity;
        let avg = entry
            .record
            .filled_avg_price
            .map(|p| (p * previous + price * quantity) / filled)
            .unwrap_or(price);
        entry.record.filled_qty = filled;
        entry.record.filled_avg_price = Some(avg);
        entry.record.status = if filled >= entry.request.quantity {
            BrokerOrderStatus::Filled
        } else {
            BrokerOrderStatus::PartiallyFilled
        };
        let record = entry.record.clone();
        drop(entry);

        self.apply_fill(&symbol, side, quantity, price);
        info!(
            "[PAPER] Filled {} {} {} @ {} ({:?})",
            broker_order_id,
            side.as_str(),
            quantity,
            price,
            record.status
        );
        Ok(record)
    }

    /// Force a broker-side status (expiry, external cancel, ...)
    pub fn set_order_status(&self, broker_order_id: &str, status: BrokerOrderStatus) {
        if let Some(mut entry) = self.orders.get_mut(broker_order_id) {
            entry.record.status = status;
        }
    }

    /// Every order request received so far
    pub fn submitted(&self) -> Vec<OrderRequest> {
        lock(&self.submitted).clone()
    }

    /// Broker IDs of orders still working
    pub fn open_order_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .orders
            .iter()
            .filter(|e| !e.value().record.status.is_terminal())
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.quotes.get(symbol).and_then(|q| q.reference_price())
    }

    fn fill_crossed(&self, symbol: &str, price: Decimal) {
        let crossed: Vec<String> = self
            .orders
            .iter()
            .filter(|e| {
                let order = e.value();
                order.request.symbol == symbol
                    && !order.record.status.is_terminal()
                    && crosses(&order.request, price)
            })
            .map(|e| e.key().clone())
            .collect();

        for id in crossed {
            let quantity = match self.orders.get(&id) {
                Some(o) => o.request.quantity - o.record.filled_qty,
                None => continue,
            };
            let fill_price = self
                .orders
                .get(&id)
                .and_then(|o| o.request.limit_price.filter(|_| o.request.order_type == OrderType::Limit))
                .unwrap_or(price);
            if let Err(e) = self.fill_order(&id, quantity, fill_price) {
                warn!("[PAPER] Could not fill crossed order {}: {}", id, e);
            }
        }
    }

    /// Move the position by a fill, re-averaging the entry when it grows
    fn apply_fill(&self, symbol: &str, side: Side, quantity: Decimal, price: Decimal) {
        let mut position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| BrokerPosition::new(symbol, Decimal::ZERO, price, price));

        let old_qty = position.qty;
        let new_qty = old_qty + side.sign() * quantity;
        if old_qty.is_zero() || old_qty.signum() != new_qty.signum() {
            position.avg_entry_price = price;
        } else if new_qty.abs() > old_qty.abs() {
            position.avg_entry_price =
                (position.avg_entry_price * old_qty.abs() + price * quantity) / new_qty.abs();
        }
        position.qty = new_qty;
        position.current_price = price;
        position.unrealized_pl = None;
        let flat = new_qty.is_zero();
        drop(position);

        if flat {
            self.positions.remove(symbol);
        }
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PaperBroker {
    fn clone(&self) -> Self {
        Self {
            quotes: Arc::clone(&self.quotes),
            orders: Arc::clone(&self.orders),
            positions: Arc::clone(&self.positions),
            scripted_failures: Arc::clone(&self.scripted_failures),
            scripted_cancel_failures: Arc::clone(&self.scripted_cancel_failures),
            submitted: Arc::clone(&self.submitted),
            failing_quotes: Arc::clone(&self.failing_quotes),
            positions_unavailable: Arc::clone(&self.positions_unavailable),
            auto_fill: Arc::clone(&self.auto_fill),
            latency_ms: Arc::clone(&self.latency_ms),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// True if a resting order would execute at `price`
fn crosses(request: &OrderRequest, price: Decimal) -> bool {
    match (request.order_type, request.side) {
        (OrderType::Market, _) => true,
        (OrderType::Limit, Side::Buy) => request.limit_price.is_some_and(|l| price <= l),
        (OrderType::Limit, Side::Sell) => request.limit_price.is_some_and(|l| price >= l),
        (OrderType::Stop | OrderType::StopLimit, Side::Buy) => {
            request.stop_price.is_some_and(|s| price >= s)
        }
        (OrderType::Stop | OrderType::StopLimit, Side::Sell) => {
            request.stop_price.is_some_and(|s| price <= s)
        }
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn submit_order(&self, request: &OrderRequest) -> Result<BrokerOrder, BrokerError> {
        self.simulate_latency().await;
        lock(&self.submitted).push(request.clone());

        if let Some(error) = lock(&self.scripted_failures).pop_front() {
            warn!(
                "[PAPER] Scripted failure for {}: {}",
                request.client_order_id, error
            );
            return Err(error);
        }
        if let Some(reason) = request.validation_error() {
            warn!("[PAPER] Rejected {}: {}", request.client_order_id, reason);
            return Err(BrokerError::Terminal(reason));
        }

        let id = format!("paper-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = BrokerOrder {
            id: id.clone(),
            client_order_id: request.client_order_id.clone(),
            status: BrokerOrderStatus::Accepted,
            filled_qty: Decimal::ZERO,
            filled_avg_price: None,
        };
        self.orders.insert(
            id.clone(),
            PaperOrder {
                request: request.clone(),
                record: record.clone(),
            },
        );
        debug!(
            "[PAPER] Accepted {} -> {} ({} {} {:?})",
            request.client_order_id,
            id,
            request.side.as_str(),
            request.quantity,
            request.order_type
        );

        if self.auto_fill.load(Ordering::SeqCst)
            && let Some(price) = self.last_price(&request.symbol)
            && crosses(request, price)
        {
            let fill_price = match request.order_type {
                OrderType::Limit => request.limit_price.unwrap_or(price),
                _ => price,
            };
            return self.fill_order(&id, request.quantity, fill_price);
        }
        Ok(record)
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError> {
        self.simulate_latency().await;
        if let Some(error) = lock(&self.scripted_cancel_failures).pop_front() {
            warn!("[PAPER] Scripted cancel failure for {}: {}", broker_order_id, error);
            return Err(error);
        }
        let mut entry = self
            .orders
            .get_mut(broker_order_id)
            .ok_or_else(|| BrokerError::NotFound(broker_order_id.to_string()))?;
        if entry.record.status.is_terminal() {
            return Err(BrokerError::AlreadyClosed(broker_order_id.to_string()));
        }
        entry.record.status = BrokerOrderStatus::Canceled;
        info!("[PAPER] Cancelled {}", broker_order_id);
        Ok(())
    }

    async fn get_order(&self, broker_order_id: &str) -> Result<BrokerOrder, BrokerError> {
        self.simulate_latency().await;
        self.orders
            .get(broker_order_id)
            .map(|o| o.record.clone())
            .ok_or_else(|| BrokerError::NotFound(broker_order_id.to_string()))
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        self.simulate_latency().await;
        if self.positions_unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Transient("positions unavailable".to_string()));
        }
        let mut positions: Vec<BrokerPosition> =
            self.positions.iter().map(|p| p.value().clone()).collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    fn name(&self) -> &str {
        "PaperBroker"
    }
}

#[async_trait]
impl QuoteSource for PaperBroker {
    async fn get_latest_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        if self.failing_quotes.contains(symbol) {
            return Err(MarketDataError::Unavailable(format!(
                "quote feed down for {symbol}"
            )));
        }
        self.quotes
            .get(symbol)
            .map(|q| q.value().clone())
            .ok_or_else(|| MarketDataError::NoQuote(symbol.to_string()))
    }
}
