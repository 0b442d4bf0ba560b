use async_trait::async_trait;
use log::debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use vigil_core::RiskConfig;
use vigil_ports::{RiskConfigRepository, StoreError, StoreResult};

/// Risk configuration persisted as a JSON file
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous row intact.
#[derive(Debug, Clone)]
pub struct JsonRiskConfigRepository {
    path: PathBuf,
}

impl JsonRiskConfigRepository {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl RiskConfigRepository for JsonRiskConfigRepository {
    async fn load(&self) -> StoreResult<Option<RiskConfig>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(backend(e)),
        };
        let config = serde_json::from_str(&contents).map_err(backend)?;
        debug!("[STORE] Loaded risk config from {}", self.path.display());
        Ok(Some(config))
    }

    async fn save(&self, config: &RiskConfig) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(config).map_err(backend)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json).await.map_err(backend)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(backend)?;
        debug!(
            "[STORE] Saved risk config v{} to {}",
            config.version,
            self.path.display()
        );
        Ok(())
    }
}
