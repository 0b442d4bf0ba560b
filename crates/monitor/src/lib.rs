//! Vigil Monitor
//!
//! Composition root of the pipeline. [`Engine::init`] builds every
//! component over the supplied collaborators and hydrates persisted state;
//! [`Engine::run_tick`] performs one serialized pass:
//!
//! ```text
//! sweep expired rules
//!   └─► positions ─► quotes (concurrent, per symbol)
//!         └─► trailing ratchet + rule evaluation (sequential, per symbol)
//!               └─► scaled-exit plans
//!                     └─► queue drain ─► broker IDs into executions
//!                           └─► status sync ─► bracket follow-up (OCO legs)
//! ```
//!
//! Rules and plans reach the queue through the engine's
//! [`IntentSink`](vigil_ports::IntentSink): risk gate, regime sizing for
//! entries, then enqueue.

pub mod config;
mod engine;
pub mod error;
mod scheduler;
mod tick;

pub use config::{BrokerSettings, ConfigError, EngineConfig, MarketHours, MonitorSettings, RiskLimits};
pub use engine::{Engine, EngineParts};
pub use error::{Error, Result};
pub use scheduler::run_scheduled;
pub use tick::TickSummary;
