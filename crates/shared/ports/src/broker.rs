use async_trait::async_trait;
use std::sync::Arc;
use vigil_core::{BrokerOrder, BrokerPosition, OrderRequest};

use crate::error::BrokerError;

/// Port for the external brokerage
///
/// Calls may block on the network. Callers wrap them in a timeout and treat
/// an elapsed timeout as transient.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Submit an order, returning the broker's record (with its assigned ID)
    async fn submit_order(&self, request: &OrderRequest) -> Result<BrokerOrder, BrokerError>;

    /// Cancel a working order by broker order ID
    ///
    /// Cancelling an order that is already closed returns
    /// [`BrokerError::AlreadyClosed`], which callers treat as success.
    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError>;

    /// Fetch the authoritative record of an order
    async fn get_order(&self, broker_order_id: &str) -> Result<BrokerOrder, BrokerError>;

    /// Current open positions
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;

    /// Adapter name for logging
    fn name(&self) -> &str {
        "Broker"
    }
}

#[async_trait]
impl<T: Broker + ?Sized> Broker for Arc<T> {
    async fn submit_order(&self, request: &OrderRequest) -> Result<BrokerOrder, BrokerError> {
        (**self).submit_order(request).await
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError> {
        (**self).cancel_order(broker_order_id).await
    }

    async fn get_order(&self, broker_order_id: &str) -> Result<BrokerOrder, BrokerError> {
        (**self).get_order(broker_order_id).await
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        (**self).get_positions().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
