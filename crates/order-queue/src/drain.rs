use log::{debug, error, info, warn};
use vigil_core::{OrderId, QueuedOrderStatus};

use crate::error::Result;
use crate::queue::OrderQueue;

/// Outcome of one [`OrderQueue::process_queue`] pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Accepted by the broker, with the broker-assigned ID
    pub submitted: Vec<(OrderId, String)>,
    /// Transient failures left pending for a later drain
    pub retried: Vec<OrderId>,
    pub failed: Vec<OrderId>,
    /// Still inside their backoff window
    pub skipped_not_due: usize,
    /// Another drain was in flight; nothing was done
    pub busy: bool,
    /// Per-order storage failures
    pub errors: Vec<String>,
}

impl OrderQueue {
    /// Submit every due pending order, highest priority first
    ///
    /// Returns immediately with `busy` set while another drain, a sync or a
    /// cancel pass is running.
    pub async fn process_queue(&self) -> Result<DrainReport> {
        let Ok(_pass) = self.pass_guard.try_lock() else {
            debug!("[QUEUE] Queue pass already in flight, skipping drain");
            return Ok(DrainReport {
                busy: true,
                ..Default::default()
            });
        };

        let now = self.clock.now();
        let mut report = DrainReport::default();
        let due: Vec<OrderId> = {
            let mut state = self.state.lock().await;
            let mut due = Vec::new();
            let mut later = Vec::new();
            while let Some((id, key)) = state.pending.pop() {
                match state.orders.get(&id) {
                    Some(order) if order.status == QueuedOrderStatus::Pending => {
                        if order.is_due(now) {
                            due.push(id);
                        } else {
                            later.push((id, key));
                        }
                    }
                    _ => {}
                }
            }
            report.skipped_not_due = later.len();
            for (id, key) in later {
                state.pending.push(id, key);
            }
            due
        };

        for id in due {
            if let Err(e) = self.submit_one(id, &mut report).await {
                error!("[QUEUE] Could not record submission of {id}: {e}");
                report.errors.push(format!("order {id}: {e}"));
            }
        }

        if !report.submitted.is_empty() || !report.retried.is_empty() || !report.failed.is_empty() {
            info!(
                "[QUEUE] Drain: {} submitted, {} retrying, {} failed, {} waiting",
                report.submitted.len(),
                report.retried.len(),
                report.failed.len(),
                report.skipped_not_due
            );
        }
        Ok(report)
    }

    async fn submit_one(&self, id: OrderId, report: &mut DrainReport) -> Result<()> {
        let Some(mut order) = self
            .current(id)
            .await
            .filter(|o| o.status == QueuedOrderStatus::Pending)
        else {
            return Ok(());
        };

        let result = self.broker.submit_order(&order.request).await;
        let now = self.clock.now();
        match result {
            Ok(placed) => {
                order.status = QueuedOrderStatus::Submitted;
                order.broker_order_id = Some(placed.id.clone());
                order.submitted_at = Some(now);
                order.next_attempt_at = None;
                info!("[QUEUE] Submitted {} as broker order {}", order.id, placed.id);
                report.submitted.push((order.id, placed.id));
            }
            Err(e) if e.is_transient() => {
                order.retry_count += 1;
                order.last_error = Some(e.to_string());
                if order.retry_count > order.max_retries {
                    order.status = QueuedOrderStatus::Failed;
                    order.completed_at = Some(now);
                    error!(
                        "[QUEUE] {} failed after {} attempts: {e}",
                        order.id, order.retry_count
                    );
                    report.failed.push(order.id);
                } else {
                    let delay = self.config.backoff(order.retry_count);
                    order.next_attempt_at = Some(now + delay);
                    warn!(
                        "[QUEUE] {} transient failure ({}/{}), retry in {} ms: {e}",
                        order.id,
                        order.retry_count,
                        order.max_retries,
                        delay.num_milliseconds()
                    );
                    report.retried.push(order.id);
                }
            }
            Err(e) => {
                order.status = QueuedOrderStatus::Failed;
                order.last_error = Some(e.to_string());
                order.completed_at = Some(now);
                error!("[QUEUE] {} rejected: {e}", order.id);
                report.failed.push(order.id);
            }
        }
        self.store(order).await
    }
}
