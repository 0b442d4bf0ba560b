use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use vigil_core::ClosedTrade;
use vigil_ports::{StoreResult, TradeHistory};

/// In-memory closed-trade history
#[derive(Clone, Default)]
pub struct InMemoryTradeHistory {
    trades: Arc<RwLock<Vec<ClosedTrade>>>,
}

impl InMemoryTradeHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradeHistory for InMemoryTradeHistory {
    async fn record(&self, trade: ClosedTrade) -> StoreResult<()> {
        self.trades.write().await.push(trade);
        Ok(())
    }

    async fn closed_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<ClosedTrade>> {
        Ok(self
            .trades
            .read()
            .await
            .iter()
            .filter(|t| t.closed_at >= since)
            .cloned()
            .collect())
    }
}
