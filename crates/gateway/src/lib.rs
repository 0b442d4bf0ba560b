//! Vigil Gateway
//!
//! Adapters between the execution pipeline and the outside world:
//! - [`PaperBroker`]: in-process brokerage and quote source. Accepts,
//!   rejects and fills orders against a settable price per symbol, with
//!   scripted failures for exercising the retry path.
//! - [`StaticRegimeSignal`]: fixed regime classification per symbol.
//! - [`TimeoutBroker`]: wraps any broker so every call is bounded by a
//!   timeout that surfaces as a transient error.
//!
//! ## Architecture
//!
//! ```text
//!   Monitor / Order Queue / Risk Gate
//!         │
//!    ┌────▼─────────┐
//!    │ TimeoutBroker│
//!    └────┬─────────┘
//!         │ Broker / QuoteSource ports
//!    ┌────▼────┐
//!    │ Adapter │  PaperBroker, or a live brokerage client
//!    └─────────┘
//! ```

pub mod adapters;
mod timeout;

pub use adapters::{PaperBroker, StaticRegimeSignal};
pub use timeout::TimeoutBroker;
