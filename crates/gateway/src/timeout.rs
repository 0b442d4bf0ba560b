use async_trait::async_trait;
use log::warn;
use std::future::Future;
use std::time::Duration;
use vigil_core::{BrokerOrder, BrokerPosition, OrderRequest};
use vigil_ports::{Broker, BrokerError};

/// Bounds every call of the wrapped broker by a timeout
///
/// An elapsed timeout becomes [`BrokerError::Timeout`], which the order
/// queue treats as transient.
pub struct TimeoutBroker<B> {
    inner: B,
    timeout: Duration,
}

impl<B: Broker> TimeoutBroker<B> {
    pub fn new(inner: B, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    async fn bounded<T, F>(&self, call: &str, fut: F) -> Result<T, BrokerError>
    where
        F: Future<Output = Result<T, BrokerError>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                let ms = self.timeout.as_millis() as u64;
                warn!("[GATEWAY] {} {} timed out after {} ms", self.inner.name(), call, ms);
                Err(BrokerError::Timeout(ms))
            }
        }
    }
}

#[async_trait]
impl<B: Broker> Broker for TimeoutBroker<B> {
    async fn submit_order(&self, request: &OrderRequest) -> Result<BrokerOrder, BrokerError> {
        self.bounded("submit_order", self.inner.submit_order(request))
            .await
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError> {
        self.bounded("cancel_order", self.inner.cancel_order(broker_order_id))
            .await
    }

    async fn get_order(&self, broker_order_id: &str) -> Result<BrokerOrder, BrokerError> {
        self.bounded("get_order", self.inner.get_order(broker_order_id))
            .await
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        self.bounded("get_positions", self.inner.get_positions())
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PaperBroker;
    use rust_decimal_macros::dec;
    use vigil_core::Side;

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_becomes_transient_timeout() {
        let paper = PaperBroker::new();
        paper.set_latency(Duration::from_secs(10));
        let broker = TimeoutBroker::new(paper.clone(), Duration::from_millis(500));

        let result = broker
            .submit_order(&OrderRequest::market("AAPL", Side::Buy, dec!(1)))
            .await;

        assert_eq!(result, Err(BrokerError::Timeout(500)));
        assert!(result.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let paper = PaperBroker::new();
        let broker = TimeoutBroker::new(paper, Duration::from_secs(1));

        assert!(broker.get_positions().await.unwrap().is_empty());
    }
}
