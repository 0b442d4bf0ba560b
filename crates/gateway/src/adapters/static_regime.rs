use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use vigil_core::{Regime, RegimeReading};
use vigil_ports::{RegimeError, RegimeSignal};

/// Regime signal returning configured classifications
///
/// Symbols without an explicit reading get the default regime. Clones share
/// their readings.
pub struct StaticRegimeSignal {
    readings: Arc<DashMap<String, RegimeReading>>,
    default: RegimeReading,
    unavailable: Arc<AtomicBool>,
}

impl StaticRegimeSignal {
    pub fn new(default: Regime) -> Self {
        Self {
            readings: Arc::new(DashMap::new()),
            default: RegimeReading {
                regime: default,
                confidence: Decimal::ONE,
            },
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_regime(&self, symbol: &str, regime: Regime) {
        self.readings.insert(
            symbol.to_string(),
            RegimeReading {
                regime,
                confidence: Decimal::ONE,
            },
        );
    }

    /// Make every lookup fail until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl Default for StaticRegimeSignal {
    fn default() -> Self {
        Self::new(Regime::Trend)
    }
}

impl Clone for StaticRegimeSignal {
    fn clone(&self) -> Self {
        Self {
            readings: Arc::clone(&self.readings),
            default: self.default,
            unavailable: Arc::clone(&self.unavailable),
        }
    }
}

#[async_trait]
impl RegimeSignal for StaticRegimeSignal {
    async fn current_regime(&self, symbol: &str) -> Result<RegimeReading, RegimeError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegimeError::Unavailable("classifier offline".to_string()));
        }
        Ok(self
            .readings
            .get(symbol)
            .map(|r| *r.value())
            .unwrap_or(self.default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_per_symbol_override() {
        let signal = StaticRegimeSignal::default();
        signal.set_regime("TSLA", Regime::Chop);

        assert_eq!(signal.current_regime("AAPL").await.unwrap().regime, Regime::Trend);
        assert_eq!(signal.current_regime("TSLA").await.unwrap().regime, Regime::Chop);

        signal.set_unavailable(true);
        assert!(signal.current_regime("AAPL").await.is_err());
    }
}
