//! Vigil Risk Gatekeeper
//!
//! Every trade intent passes this gate before it can reach the order queue.
//!
//! - **Checks**: seven named checks run in a fixed order, all of them every
//!   time, so a rejection lists every reason at once
//! - **Kill switch**: the negation of `trading_enabled`, persisted with the
//!   risk configuration and mirrored in memory
//! - **Hydration**: the mirror is loaded from storage once per process;
//!   concurrent first callers share that one load
//!
//! ```text
//! TradeIntent ──► trading_enabled ──► symbol_allowed ──► order_size
//!             ──► position_size ──► daily_loss_limit ──► sanity_check
//!             ──► regime_check ──► RiskDecision { approved, checks, size_multiplier }
//! ```

pub mod checks;
pub mod error;
mod gatekeeper;

pub use checks::{CheckOutcome, RiskDecision};
pub use error::{Error, Result};
pub use gatekeeper::RiskGatekeeper;
