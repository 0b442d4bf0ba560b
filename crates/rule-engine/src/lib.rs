//! Vigil Rule Engine
//!
//! Conditional rules that fire orders when their trigger is met:
//!
//! - **Trigger Evaluator** ([`trigger`]): pure decision of whether a rule
//!   fires at a price, direction-aware for long and short positions
//! - **Planning** ([`planning`]): manual rules, quick stop/target setup and
//!   one-cancels-other pairs, validated before anything is stored
//! - **Rule Book** ([`RuleBook`]): status transitions, OCO group
//!   cancellation, expiry sweep, annotated listing and per-symbol evaluation
//!
//! ## Fire sequence
//!
//! ```text
//! price ──► fires? ──► IntentSink ──► Ok(order) ──► triggered
//!                          │                        cancel OCO siblings
//!                          │                        execution record
//!                          └──► Err ──► execution record (rule stays active)
//! ```

pub mod book;
pub mod error;
pub mod planning;
pub mod trigger;

pub use book::{RuleBook, RuleFire, RuleView, SymbolEvaluation};
pub use error::{Error, Result};
pub use planning::{ExitLeg, NewRule, OcoPair, OcoRequest, QuickSetup};
