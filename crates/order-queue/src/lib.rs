//! Vigil Order Queue
//!
//! Owns the submission lifecycle of every broker order:
//!
//! - **Drain**: pending orders go out highest priority first, FIFO within a
//!   priority, each after its backoff has elapsed
//! - **Retry**: transient broker failures keep the order pending until the
//!   retry budget is spent; terminal failures fail it at once
//! - **Sync**: working orders are reconciled against the broker, which is
//!   authoritative for fills
//! - **Cancel**: an order the broker already closed takes the broker's
//!   status rather than `Cancelled`
//!
//! Drains, syncs and cancels never overlap; a drain that finds another pass
//! running reports itself busy.
//!
//! ```text
//!  enqueue ──► [Pending] ──submit ok──► [Submitted] ──sync──► [PartiallyFilled] ──► [Filled]
//!                │   ▲                      │
//!     transient  │   │ backoff              └──sync (broker cancel/reject)──► [Cancelled]/[Failed]
//!                ▼   │
//!            retry_count > max_retries / terminal ──► [Failed]
//! ```

mod builders;
pub mod config;
mod drain;
pub mod error;
mod queue;
mod sync;

pub use builders::{BRACKET_KEY, BracketLegs, BracketOrder};
pub use config::QueueConfig;
pub use drain::DrainReport;
pub use error::{Error, Result};
pub use queue::{CancelReport, NewOrder, OrderQueue};
pub use sync::{SyncMismatch, SyncReport};
