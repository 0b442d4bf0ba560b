//! Order queue errors

use thiserror::Error;
use vigil_core::OrderId;
use vigil_ports::{BrokerError, StoreError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid order: {0}")]
    Validation(String),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;
