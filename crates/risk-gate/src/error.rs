//! Risk gate errors

use thiserror::Error;
use vigil_ports::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    /// At least one check failed; `reason` joins every failed check's detail
    #[error("Risk rejected: {reason}")]
    RiskRejected { reason: String },

    #[error("Invalid risk configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;
