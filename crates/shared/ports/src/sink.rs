use async_trait::async_trait;
use vigil_core::{OrderId, TradeIntent};

use crate::error::IntentError;

/// Where rule and plan evaluation send the trades they decide on
///
/// The production sink runs the risk gate and enqueues approved orders.
#[async_trait]
pub trait IntentSink: Send + Sync {
    /// Gate and queue an intent, returning the queued order ID
    async fn submit_intent(&self, intent: TradeIntent) -> Result<OrderId, IntentError>;
}
