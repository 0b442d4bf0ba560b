use async_trait::async_trait;
use vigil_core::Quote;

use crate::error::MarketDataError;

/// Port for the quote source
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Latest bid/ask/last for a symbol
    async fn get_latest_quote(&self, symbol: &str) -> Result<Quote, MarketDataError>;
}
