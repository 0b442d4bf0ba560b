use log::{debug, info, warn};
use priority_queue::PriorityQueue;
use serde_json::{Map, Value};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;
use vigil_core::{OrderId, OrderRequest, QueuedOrder, QueuedOrderStatus};
use vigil_ports::{Broker, BrokerError, Clock, OrderRepository};

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::sync::absorb;

/// Drain order: priority descending, then enqueue sequence ascending
pub(crate) type DrainKey = (i32, Reverse<u64>);

/// An order to be queued
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub request: OrderRequest,
    /// Falls back to [`QueueConfig::default_priority`]
    pub priority: Option<i32>,
    /// Falls back to [`QueueConfig::default_max_retries`]
    pub max_retries: Option<u32>,
    pub metadata: Map<String, Value>,
}

impl NewOrder {
    pub fn new(request: OrderRequest) -> Self {
        Self {
            request,
            priority: None,
            max_retries: None,
            metadata: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outcome of [`OrderQueue::cancel_all_pending_orders`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CancelReport {
    pub cancelled: Vec<OrderId>,
    /// Closed at the broker before the cancel arrived; the local record now
    /// carries the broker's final status
    pub already_closed: Vec<OrderId>,
    /// Broker calls that failed, with the error text; these orders are left
    /// as they were
    pub broker_failures: Vec<(OrderId, String)>,
}

/// Result of cancelling one live order at the broker
enum CancelOutcome {
    Cancelled(QueuedOrder),
    Closed(QueuedOrder),
    Failed(BrokerError),
}

#[derive(Default)]
pub(crate) struct QueueState {
    pub(crate) pending: PriorityQueue<OrderId, DrainKey>,
    pub(crate) orders: HashMap<OrderId, QueuedOrder>,
}

impl QueueState {
    pub(crate) fn insert(&mut self, order: QueuedOrder) {
        if order.status == QueuedOrderStatus::Pending {
            self.pending
                .push(order.id, (order.priority, Reverse(order.sequence)));
        } else {
            self.pending.remove(&order.id);
        }
        self.orders.insert(order.id, order);
    }
}

/// Priority queue of broker orders
///
/// The in-memory view holds every order this process has touched and is
/// the authority for what to submit next; each mutation is written through
/// to the [`OrderRepository`].
pub struct OrderQueue {
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) repo: Arc<dyn OrderRepository>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: QueueConfig,
    pub(crate) state: Mutex<QueueState>,
    /// Held for the whole of a drain, sync or cancel pass
    pub(crate) pass_guard: Mutex<()>,
    sequence: AtomicU64,
}

impl OrderQueue {
    pub fn new(
        broker: Arc<dyn Broker>,
        repo: Arc<dyn OrderRepository>,
        clock: Arc<dyn Clock>,
        config: QueueConfig,
    ) -> Self {
        Self {
            broker,
            repo,
            clock,
            config,
            state: Mutex::new(QueueState::default()),
            pass_guard: Mutex::new(()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Reload live orders (pending and working) from the repository
    ///
    /// Returns the number of orders restored.
    pub async fn restore(&self) -> Result<usize> {
        let mut live = Vec::new();
        for status in [
            QueuedOrderStatus::Pending,
            QueuedOrderStatus::Submitted,
            QueuedOrderStatus::PartiallyFilled,
        ] {
            live.extend(self.repo.list_by_status(status).await?);
        }

        let next = live.iter().map(|o| o.sequence + 1).max().unwrap_or(0);
        self.sequence.fetch_max(next, Ordering::SeqCst);

        let count = live.len();
        let mut state = self.state.lock().await;
        for order in live {
            state.insert(order);
        }
        if count > 0 {
            info!("[QUEUE] Restored {count} live orders");
        }
        Ok(count)
    }

    fn build(&self, new: NewOrder) -> Result<QueuedOrder> {
        if let Some(problem) = new.request.validation_error() {
            return Err(Error::Validation(problem));
        }
        let id = Uuid::new_v4();
        let mut request = new.request;
        request.symbol = request.symbol.trim().to_uppercase();
        if request.client_order_id.is_empty() {
            request.client_order_id = id.to_string();
        }
        Ok(QueuedOrder {
            id,
            request,
            priority: new.priority.unwrap_or(self.config.default_priority),
            status: QueuedOrderStatus::Pending,
            broker_order_id: None,
            retry_count: 0,
            max_retries: new.max_retries.unwrap_or(self.config.default_max_retries),
            last_error: None,
            filled_qty: Default::default(),
            avg_fill_price: None,
            created_at: self.clock.now(),
            submitted_at: None,
            completed_at: None,
            next_attempt_at: None,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            metadata: new.metadata,
        })
    }

    pub async fn enqueue(&self, new: NewOrder) -> Result<QueuedOrder> {
        let order = self.build(new)?;
        self.repo.save(order.clone()).await?;
        self.state.lock().await.insert(order.clone());
        info!(
            "[QUEUE] Enqueued {} {} {} {} (priority {})",
            order.id,
            order.request.side.as_str(),
            order.request.quantity,
            order.request.symbol,
            order.priority
        );
        Ok(order)
    }

    /// Queue several orders; nothing is queued if any is invalid
    pub async fn enqueue_batch(&self, batch: Vec<NewOrder>) -> Result<Vec<QueuedOrder>> {
        for (index, new) in batch.iter().enumerate() {
            if let Some(problem) = new.request.validation_error() {
                return Err(Error::Validation(format!("order {index}: {problem}")));
            }
        }
        let orders = batch
            .into_iter()
            .map(|new| self.build(new))
            .collect::<Result<Vec<_>>>()?;
        for order in &orders {
            self.repo.save(order.clone()).await?;
        }
        let mut state = self.state.lock().await;
        for order in &orders {
            state.insert(order.clone());
        }
        info!("[QUEUE] Enqueued batch of {}", orders.len());
        Ok(orders)
    }

    /// Look up an order in the view, falling back to the repository
    pub async fn get(&self, id: OrderId) -> Result<Option<QueuedOrder>> {
        if let Some(order) = self.state.lock().await.orders.get(&id) {
            return Ok(Some(order.clone()));
        }
        Ok(self.repo.get(id).await?)
    }

    /// Orders in the view, in enqueue order
    pub async fn list(&self, status: Option<QueuedOrderStatus>) -> Vec<QueuedOrder> {
        let state = self.state.lock().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.sequence);
        orders
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Refresh the view, then persist
    ///
    /// The view is updated even when the write fails, so a pending order
    /// stays queued and a submitted one stays tracked.
    pub(crate) async fn store(&self, order: QueuedOrder) -> Result<()> {
        self.state.lock().await.insert(order.clone());
        self.repo.save(order).await?;
        Ok(())
    }

    /// Current view of an order
    pub(crate) async fn current(&self, id: OrderId) -> Option<QueuedOrder> {
        self.state.lock().await.orders.get(&id).cloned()
    }

    /// Replace an order's metadata entry
    pub async fn set_metadata(&self, id: OrderId, key: &str, value: Value) -> Result<QueuedOrder> {
        let mut order = self.get(id).await?.ok_or(Error::OrderNotFound(id))?;
        order.metadata.insert(key.to_string(), value);
        self.store(order.clone()).await?;
        Ok(order)
    }

    /// Cancel one order
    ///
    /// Working orders are cancelled at the broker first. An order the broker
    /// has already closed takes the broker's status instead; terminal orders
    /// are returned unchanged.
    pub async fn cancel_order(&self, id: OrderId) -> Result<QueuedOrder> {
        let _pass = self.pass_guard.lock().await;
        let order = self.get(id).await?.ok_or(Error::OrderNotFound(id))?;
        if order.status.is_terminal() {
            debug!("[QUEUE] Cancel of {id} ignored, already {:?}", order.status);
            return Ok(order);
        }
        match self.cancel_at_broker(order).await {
            CancelOutcome::Cancelled(order) => {
                self.store(order.clone()).await?;
                info!("[QUEUE] Cancelled {id}");
                Ok(order)
            }
            CancelOutcome::Closed(order) => {
                self.store(order.clone()).await?;
                info!("[QUEUE] {id} already closed at broker as {:?}", order.status);
                Ok(order)
            }
            CancelOutcome::Failed(e) => Err(e.into()),
        }
    }

    /// Cancel every pending or working order
    ///
    /// Individual broker failures are reported, not raised, and the rest of
    /// the batch is still processed.
    pub async fn cancel_all_pending_orders(&self) -> Result<CancelReport> {
        let _pass = self.pass_guard.lock().await;
        let ids: Vec<OrderId> = {
            let state = self.state.lock().await;
            let mut live: Vec<&QueuedOrder> = state
                .orders
                .values()
                .filter(|o| is_live(o))
                .collect();
            live.sort_by_key(|o| o.sequence);
            live.into_iter().map(|o| o.id).collect()
        };

        let mut report = CancelReport::default();
        for id in ids {
            let Some(order) = self.current(id).await.filter(is_live) else {
                continue;
            };
            match self.cancel_at_broker(order).await {
                CancelOutcome::Cancelled(order) => {
                    report.cancelled.push(id);
                    self.store(order).await?;
                }
                CancelOutcome::Closed(order) => {
                    report.already_closed.push(id);
                    self.store(order).await?;
                }
                CancelOutcome::Failed(e) => {
                    warn!("[QUEUE] Broker cancel of {id} failed: {e}");
                    report.broker_failures.push((id, e.to_string()));
                }
            }
        }
        info!(
            "[QUEUE] Cancelled {} orders ({} already closed, {} broker failures)",
            report.cancelled.len(),
            report.already_closed.len(),
            report.broker_failures.len()
        );
        Ok(report)
    }

    async fn cancel_at_broker(&self, mut order: QueuedOrder) -> CancelOutcome {
        let now = self.clock.now();
        if let Some(broker_id) = order.broker_order_id.clone() {
            match self.broker.cancel_order(&broker_id).await {
                Ok(()) | Err(BrokerError::NotFound(_)) => {}
                Err(BrokerError::AlreadyClosed(_)) => {
                    return match self.broker.get_order(&broker_id).await {
                        Ok(remote) => {
                            absorb(&mut order, &remote, now);
                            CancelOutcome::Closed(order)
                        }
                        Err(e) => CancelOutcome::Failed(e),
                    };
                }
                Err(e) => return CancelOutcome::Failed(e),
            }
        }
        order.status = QueuedOrderStatus::Cancelled;
        order.completed_at = Some(now);
        CancelOutcome::Cancelled(order)
    }

    /// Drop terminal orders from the view
    ///
    /// Repository history is untouched. Bracket entries whose legs have not
    /// been spawned yet are kept.
    pub async fn clear_completed(&self) -> usize {
        let mut state = self.state.lock().await;
        let before = state.orders.len();
        state
            .orders
            .retain(|_, o| !o.status.is_terminal() || crate::BracketLegs::awaiting_spawn(o));
        let purged = before - state.orders.len();
        debug!("[QUEUE] Cleared {purged} completed orders");
        purged
    }
}

fn is_live(order: &QueuedOrder) -> bool {
    order.status == QueuedOrderStatus::Pending || order.status.is_working()
}
