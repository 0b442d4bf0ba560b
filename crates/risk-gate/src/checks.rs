//! The individual approval checks
//!
//! Each check is a pure function of its inputs so the gatekeeper can run all
//! of them and report every outcome.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use vigil_core::{Regime, RegimeReading, RiskConfig, TradeIntent};

use crate::error::{Error, Result};

pub const TRADING_ENABLED: &str = "trading_enabled";
pub const SYMBOL_ALLOWED: &str = "symbol_allowed";
pub const ORDER_SIZE: &str = "order_size";
pub const POSITION_SIZE: &str = "position_size";
pub const DAILY_LOSS_LIMIT: &str = "daily_loss_limit";
pub const SANITY_CHECK: &str = "sanity_check";
pub const REGIME_CHECK: &str = "regime_check";

/// Advisory multiplier when no regime reading could be obtained
pub const UNAVAILABLE_REGIME_MULTIPLIER: Decimal = dec!(0.5);

/// Result of one named check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckOutcome {
    pub fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Verdict on a trade intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub approved: bool,
    /// Every check, in evaluation order
    pub checks: Vec<CheckOutcome>,
    /// Advisory sizing from the regime check (1 = full size)
    pub size_multiplier: Decimal,
    pub regime: Option<Regime>,
}

impl RiskDecision {
    pub fn from_checks(checks: Vec<CheckOutcome>, size_multiplier: Decimal, regime: Option<Regime>) -> Self {
        Self {
            approved: checks.iter().all(|c| c.passed),
            checks,
            size_multiplier,
            regime,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Failed checks as `name: detail`, joined with `"; "`
    pub fn reason(&self) -> String {
        self.failures()
            .map(|c| format!("{}: {}", c.name, c.detail))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn check(&self, name: &str) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// `Ok(self)` if approved, else [`Error::RiskRejected`]
    pub fn into_result(self) -> Result<Self> {
        if self.approved {
            Ok(self)
        } else {
            Err(Error::RiskRejected {
                reason: self.reason(),
            })
        }
    }
}

pub fn trading_enabled(config: &RiskConfig, kill_switch_active: bool) -> CheckOutcome {
    if kill_switch_active || !config.trading_enabled {
        let reason = config
            .kill_switch_reason
            .as_deref()
            .unwrap_or("no reason given");
        CheckOutcome::fail(TRADING_ENABLED, format!("kill switch active ({reason})"))
    } else {
        CheckOutcome::pass(TRADING_ENABLED, "trading enabled")
    }
}

pub fn symbol_allowed(config: &RiskConfig, symbol: &str) -> CheckOutcome {
    if config.is_symbol_allowed(symbol) {
        CheckOutcome::pass(SYMBOL_ALLOWED, format!("{symbol} allowed"))
    } else {
        CheckOutcome::fail(
            SYMBOL_ALLOWED,
            format!("{symbol} is not in the allowed symbols"),
        )
    }
}

pub fn order_size(config: &RiskConfig, quantity: Decimal) -> CheckOutcome {
    if quantity <= config.max_order_size {
        CheckOutcome::pass(ORDER_SIZE, format!("{quantity} <= {}", config.max_order_size))
    } else {
        CheckOutcome::fail(
            ORDER_SIZE,
            format!(
                "quantity {quantity} exceeds max order size {}",
                config.max_order_size
            ),
        )
    }
}

/// `current` is the signed position in the intent's symbol, or why it is unknown
pub fn position_size(
    config: &RiskConfig,
    intent: &TradeIntent,
    current: std::result::Result<Decimal, String>,
) -> CheckOutcome {
    let current = match current {
        Ok(qty) => qty,
        Err(e) => return CheckOutcome::fail(POSITION_SIZE, format!("positions unavailable: {e}")),
    };
    let resulting = current + intent.side.sign() * intent.quantity;
    let cap = config.max_position_size;
    if resulting.abs() <= cap {
        CheckOutcome::pass(POSITION_SIZE, format!("resulting position {resulting} within ±{cap}"))
    } else {
        CheckOutcome::fail(
            POSITION_SIZE,
            format!("resulting position {resulting} exceeds ±{cap}"),
        )
    }
}

/// `pnl` is (realized since local midnight, unrealized of open positions)
pub fn daily_loss_limit(
    config: &RiskConfig,
    pnl: std::result::Result<(Decimal, Decimal), String>,
) -> CheckOutcome {
    let (realized, unrealized) = match pnl {
        Ok(pnl) => pnl,
        Err(e) => return CheckOutcome::fail(DAILY_LOSS_LIMIT, format!("P&L unavailable: {e}")),
    };
    let total = realized + unrealized;
    let floor = -config.max_daily_loss;
    if total > floor {
        CheckOutcome::pass(DAILY_LOSS_LIMIT, format!("daily P&L {total} above {floor}"))
    } else {
        CheckOutcome::fail(
            DAILY_LOSS_LIMIT,
            format!(
                "daily P&L {total} (realized {realized}, unrealized {unrealized}) breaches {floor}"
            ),
        )
    }
}

pub fn sanity_check(intent: &TradeIntent) -> CheckOutcome {
    let problem = if intent.symbol.trim().is_empty() {
        Some("symbol is empty".to_string())
    } else if intent.quantity <= Decimal::ZERO {
        Some(format!("quantity {} is not positive", intent.quantity))
    } else if intent.order_type.requires_limit_price()
        && intent.limit_price.is_none_or(|p| p <= Decimal::ZERO)
    {
        Some(format!("{:?} order without a valid limit price", intent.order_type))
    } else if intent.order_type.requires_stop_price()
        && intent.stop_price.is_none_or(|p| p <= Decimal::ZERO)
    {
        Some(format!("{:?} order without a valid stop price", intent.order_type))
    } else {
        None
    };
    match problem {
        Some(problem) => CheckOutcome::fail(SANITY_CHECK, problem),
        None => CheckOutcome::pass(SANITY_CHECK, "well formed"),
    }
}

/// `reading` is `None` when the intent skips the regime check
///
/// An unobtainable reading never blocks: it passes at a reduced advisory size.
pub fn regime_check(
    reading: Option<std::result::Result<RegimeReading, String>>,
) -> (CheckOutcome, Decimal, Option<Regime>) {
    match reading {
        None => (
            CheckOutcome::pass(REGIME_CHECK, "skipped"),
            Decimal::ONE,
            None,
        ),
        Some(Err(e)) => (
            CheckOutcome::pass(REGIME_CHECK, format!("regime unavailable: {e}")),
            UNAVAILABLE_REGIME_MULTIPLIER,
            None,
        ),
        Some(Ok(reading)) if reading.regime.blocks_trading() => (
            CheckOutcome::fail(REGIME_CHECK, format!("regime {:?} blocks new trades", reading.regime)),
            Decimal::ZERO,
            Some(reading.regime),
        ),
        Some(Ok(reading)) => {
            let multiplier = reading.regime.size_multiplier();
            (
                CheckOutcome::pass(
                    REGIME_CHECK,
                    format!("regime {:?}, size x{multiplier}", reading.regime),
                ),
                multiplier,
                Some(reading.regime),
            )
        }
    }
}
