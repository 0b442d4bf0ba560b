//! Vigil Ports
//!
//! Port definitions (traits) for the Vigil order automation system.
//! These define the boundaries between the execution pipeline and its
//! external collaborators: brokerage, market data, regime signal, and storage.

mod broker;
mod clock;
mod error;
mod market_data;
mod regime;
mod repositories;
mod sink;

pub use broker::Broker;
pub use clock::Clock;
pub use error::{BrokerError, IntentError, MarketDataError, RegimeError, StoreError, StoreResult};
pub use market_data::QuoteSource;
pub use regime::RegimeSignal;
pub use repositories::{
    ExecutionLog, OrderRepository, PlanRepository, RiskConfigRepository, RuleRepository,
    TradeHistory,
};
pub use sink::IntentSink;
