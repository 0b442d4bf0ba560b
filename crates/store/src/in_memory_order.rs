use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use vigil_core::{OrderId, QueuedOrder, QueuedOrderStatus};
use vigil_ports::{OrderRepository, StoreError, StoreResult};

/// In-memory queued-order history
///
/// Keeps every order ever queued; the queue's own view may purge
/// completed orders without touching this history.
pub struct InMemoryOrderRepository {
    orders: Arc<DashMap<OrderId, QueuedOrder>>,
    writes_failing: Arc<AtomicBool>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(DashMap::new()),
            writes_failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of orders ever stored
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Make every `save` fail until cleared
    pub fn fail_writes(&self, failing: bool) {
        self.writes_failing.store(failing, Ordering::SeqCst);
    }
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryOrderRepository {
    fn clone(&self) -> Self {
        Self {
            orders: Arc::clone(&self.orders),
            writes_failing: Arc::clone(&self.writes_failing),
        }
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: QueuedOrder) -> StoreResult<()> {
        if self.writes_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("order store unavailable".to_string()));
        }
        self.orders.insert(order.id, order);
        Ok(())
    }

    async fn get(&self, id: OrderId) -> StoreResult<Option<QueuedOrder>> {
        Ok(self.orders.get(&id).map(|o| o.value().clone()))
    }

    async fn list_by_status(&self, status: QueuedOrderStatus) -> StoreResult<Vec<QueuedOrder>> {
        let mut orders: Vec<QueuedOrder> = self
            .orders
            .iter()
            .filter(|e| e.value().status == status)
            .map(|e| e.value().clone())
            .collect();
        orders.sort_by_key(|o| o.sequence);
        Ok(orders)
    }
}
