//! Engine errors

use thiserror::Error;
use vigil_ports::BrokerError;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Rules(#[from] vigil_rules::Error),

    #[error(transparent)]
    Plans(#[from] vigil_scaled_exit::Error),

    #[error(transparent)]
    Risk(#[from] vigil_risk_gate::Error),

    #[error(transparent)]
    Queue(#[from] vigil_order_queue::Error),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
