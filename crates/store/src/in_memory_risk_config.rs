use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use vigil_core::RiskConfig;
use vigil_ports::{RiskConfigRepository, StoreResult};

/// In-memory risk configuration row
///
/// Counts loads so callers can verify the row is hydrated once.
#[derive(Default)]
pub struct InMemoryRiskConfigRepository {
    row: Arc<RwLock<Option<RiskConfig>>>,
    loads: Arc<AtomicUsize>,
}

impl InMemoryRiskConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-populated with a row
    pub fn with_config(config: RiskConfig) -> Self {
        Self {
            row: Arc::new(RwLock::new(Some(config))),
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `load` calls served
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl Clone for InMemoryRiskConfigRepository {
    fn clone(&self) -> Self {
        Self {
            row: Arc::clone(&self.row),
            loads: Arc::clone(&self.loads),
        }
    }
}

#[async_trait]
impl RiskConfigRepository for InMemoryRiskConfigRepository {
    async fn load(&self) -> StoreResult<Option<RiskConfig>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.row.read().await.clone())
    }

    async fn save(&self, config: &RiskConfig) -> StoreResult<()> {
        *self.row.write().await = Some(config.clone());
        Ok(())
    }
}
