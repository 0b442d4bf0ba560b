//! Scaled exit errors

use thiserror::Error;
use vigil_core::{PlanId, PlanStatus};
use vigil_ports::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed plan parameters; nothing was stored
    #[error("Invalid plan: {0}")]
    Validation(String),

    #[error("Plan not found: {0}")]
    PlanNotFound(PlanId),

    #[error("Plan {id} is {status:?}")]
    NotActive { id: PlanId, status: PlanStatus },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;
