use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::OrderRequest;

/// Unique identifier for a queued order
pub type OrderId = Uuid;

/// Submission lifecycle of a queued order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuedOrderStatus {
    /// Waiting for (re)submission
    Pending,
    /// Accepted by the brokerage, awaiting fills
    Submitted,
    Filled,
    PartiallyFilled,
    Failed,
    Cancelled,
}

impl QueuedOrderStatus {
    /// Returns true if the order is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueuedOrderStatus::Filled | QueuedOrderStatus::Failed | QueuedOrderStatus::Cancelled
        )
    }

    /// Returns true if the order is working at the brokerage
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            QueuedOrderStatus::Submitted | QueuedOrderStatus::PartiallyFilled
        )
    }
}

/// A broker order owned by the order queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOrder {
    pub id: OrderId,
    pub request: OrderRequest,
    /// Higher drains first
    pub priority: i32,
    pub status: QueuedOrderStatus,
    pub broker_order_id: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Last submission error, kept verbatim
    pub last_error: Option<String>,
    pub filled_qty: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Earliest time of the next submission attempt (backoff)
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Enqueue order, breaks priority ties FIFO
    pub sequence: u64,
    pub metadata: Map<String, Value>,
}

impl QueuedOrder {
    pub fn symbol(&self) -> &str {
        &self.request.symbol
    }

    /// True once the submission attempt time has been reached
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.is_none_or(|at| now >= at)
    }

    /// Remaining quantity to be filled
    pub fn remaining_quantity(&self) -> Decimal {
        self.request.quantity - self.filled_qty
    }
}
