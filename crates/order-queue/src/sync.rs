use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use vigil_core::{BrokerOrder, BrokerOrderStatus, OrderId, QueuedOrder, QueuedOrderStatus};

use crate::error::Result;
use crate::queue::OrderQueue;

/// A broker report the local record did not predict
///
/// The local record has already been overwritten to match the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncMismatch {
    pub order_id: OrderId,
    pub local: QueuedOrderStatus,
    pub broker: BrokerOrderStatus,
    pub detail: String,
}

/// Outcome of one [`OrderQueue::sync_order_statuses`] pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Orders whose status or fill changed
    pub updated: Vec<OrderId>,
    /// Orders whose filled quantity grew, as reconciled
    pub fills: Vec<QueuedOrder>,
    pub mismatches: Vec<SyncMismatch>,
    /// Per-order broker or storage failures
    pub errors: Vec<String>,
}

pub(crate) fn local_status(status: BrokerOrderStatus) -> QueuedOrderStatus {
    match status {
        BrokerOrderStatus::Accepted => QueuedOrderStatus::Submitted,
        BrokerOrderStatus::PartiallyFilled => QueuedOrderStatus::PartiallyFilled,
        BrokerOrderStatus::Filled => QueuedOrderStatus::Filled,
        BrokerOrderStatus::Canceled | BrokerOrderStatus::Expired => QueuedOrderStatus::Cancelled,
        BrokerOrderStatus::Rejected => QueuedOrderStatus::Failed,
    }
}

fn mismatch(order: &QueuedOrder, remote: &BrokerOrder) -> Option<String> {
    if remote.filled_qty < order.filled_qty {
        return Some(format!(
            "broker filled {} below local {}",
            remote.filled_qty, order.filled_qty
        ));
    }
    if remote.filled_qty > order.request.quantity {
        return Some(format!(
            "broker filled {} above ordered {}",
            remote.filled_qty, order.request.quantity
        ));
    }
    match remote.status {
        BrokerOrderStatus::Canceled | BrokerOrderStatus::Expired | BrokerOrderStatus::Rejected => {
            Some(format!("broker closed the order as {:?}", remote.status))
        }
        _ => None,
    }
}

/// Overwrite an order's lifecycle and fill state with the broker's record
pub(crate) fn absorb(order: &mut QueuedOrder, remote: &BrokerOrder, now: DateTime<Utc>) {
    let status = local_status(remote.status);
    order.status = status;
    order.filled_qty = remote.filled_qty;
    order.avg_fill_price = remote.filled_avg_price;
    if status.is_terminal() {
        order.completed_at = Some(now);
    }
    if status == QueuedOrderStatus::Failed {
        order.last_error = Some(format!("broker reported {:?}", remote.status));
    }
}

impl OrderQueue {
    /// Reconcile working orders against the broker
    ///
    /// Only submitted and partially filled orders are polled; pending orders
    /// are never touched.
    pub async fn sync_order_statuses(&self) -> Result<SyncReport> {
        let _pass = self.pass_guard.lock().await;
        let working: Vec<(OrderId, String)> = {
            let state = self.state.lock().await;
            let mut working: Vec<&QueuedOrder> = state
                .orders
                .values()
                .filter(|o| o.status.is_working())
                .collect();
            working.sort_by_key(|o| o.sequence);
            working
                .into_iter()
                .filter_map(|o| o.broker_order_id.clone().map(|b| (o.id, b)))
                .collect()
        };

        let mut report = SyncReport::default();
        for (id, broker_id) in working {
            let remote = match self.broker.get_order(&broker_id).await {
                Ok(remote) => remote,
                Err(e) => {
                    warn!("[QUEUE] Status poll of {id} failed: {e}");
                    report.errors.push(format!("order {id}: {e}"));
                    continue;
                }
            };
            let Some(order) = self.current(id).await.filter(|o| o.status.is_working()) else {
                continue;
            };
            if let Err(e) = self.reconcile(order, remote, &mut report).await {
                report.errors.push(e.to_string());
            }
        }

        if !report.updated.is_empty() {
            info!(
                "[QUEUE] Sync: {} updated, {} fills, {} mismatches",
                report.updated.len(),
                report.fills.len(),
                report.mismatches.len()
            );
        }
        Ok(report)
    }

    async fn reconcile(
        &self,
        mut order: QueuedOrder,
        remote: BrokerOrder,
        report: &mut SyncReport,
    ) -> Result<()> {
        let status = local_status(remote.status);
        let filled_more = remote.filled_qty > order.filled_qty;
        if status == order.status && !filled_more && remote.filled_avg_price == order.avg_fill_price {
            debug!("[QUEUE] {} unchanged ({:?})", order.id, status);
            return Ok(());
        }

        if let Some(detail) = mismatch(&order, &remote) {
            warn!(
                "[QUEUE] {} reconciliation mismatch ({:?} locally, {:?} at broker): {detail}",
                order.id, order.status, remote.status
            );
            report.mismatches.push(SyncMismatch {
                order_id: order.id,
                local: order.status,
                broker: remote.status,
                detail,
            });
        }

        absorb(&mut order, &remote, self.clock.now());

        report.updated.push(order.id);
        if filled_more {
            report.fills.push(order.clone());
        }
        self.store(order).await
    }
}
