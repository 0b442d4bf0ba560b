use async_trait::async_trait;
use vigil_core::RegimeReading;

use crate::error::RegimeError;

/// Port for the external market-regime classifier
///
/// Only the classification contract is consumed; model internals live with
/// the provider.
#[async_trait]
pub trait RegimeSignal: Send + Sync {
    /// Current regime for a symbol
    async fn current_regime(&self, symbol: &str) -> Result<RegimeReading, RegimeError>;
}
