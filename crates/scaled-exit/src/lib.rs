//! Vigil Scaled Exit Planner
//!
//! Sells a position down in steps: each target sells a fixed share of the
//! original quantity once profit reaches its level, and an optional
//! trailing leg sells whatever is left after price retraces from its best
//! level.
//!
//! Decisions are computed by the pure [`evaluate`] and applied by
//! [`ScaledExitPlanner::on_tick`], which routes exits through an
//! [`IntentSink`](vigil_ports::IntentSink) like any other trade.

pub mod error;
pub mod plan;
mod planner;

pub use error::{Error, Result};
pub use plan::{NewPlan, PlanStep, PlanUpdate, TargetSpec, TrailingSpec, evaluate};
pub use planner::{PlanExit, PlanTickOutcome, ScaledExitPlanner};
