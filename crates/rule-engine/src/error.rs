//! Rule engine errors

use thiserror::Error;
use vigil_core::{RuleId, RuleStatus};
use vigil_ports::{IntentError, StoreError};

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed rule parameters; nothing was stored
    #[error("Invalid rule: {0}")]
    Validation(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(RuleId),

    #[error("Rule {id} is {from:?}, cannot move to {to:?}")]
    InvalidTransition {
        id: RuleId,
        from: RuleStatus,
        to: RuleStatus,
    },

    /// The fired rule's order was refused or could not be queued
    #[error("Order not placed: {0}")]
    NotPlaced(#[from] IntentError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;
