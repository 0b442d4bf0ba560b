use thiserror::Error;

/// Errors returned by brokerage adapters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Network failure, rate limit or 5xx; safe to retry
    #[error("Transient broker error: {0}")]
    Transient(String),

    /// The call did not complete within the configured timeout; safe to retry
    #[error("Broker call timed out after {0} ms")]
    Timeout(u64),

    /// Rejected order, insufficient funds or shares; never retried
    #[error("Order rejected by broker: {0}")]
    Terminal(String),

    /// Unknown broker order ID
    #[error("Broker order not found: {0}")]
    NotFound(String),

    /// Cancel of an order that is already filled, cancelled or expired
    #[error("Broker order already closed: {0}")]
    AlreadyClosed(String),
}

impl BrokerError {
    /// Transient failures leave the order pending for a later drain
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transient(_) | BrokerError::Timeout(_))
    }
}

/// Errors returned by market data sources
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    #[error("No quote available for {0}")]
    NoQuote(String),

    #[error("Market data unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the regime signal provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegimeError {
    #[error("Regime signal unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by persistence adapters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned when handing a trade intent to the execution pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntentError {
    /// The risk gate refused the intent; `reason` lists every failed check
    #[error("Risk rejected: {0}")]
    Rejected(String),

    /// The intent was approved but could not be queued
    #[error("Intent could not be queued: {0}")]
    Failed(String),
}
