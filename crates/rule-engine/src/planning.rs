//! Rule planning
//!
//! Turns creation requests into validated [`AutomationRule`]s. Nothing here
//! touches storage: a request either yields complete rules or a
//! [`Error::Validation`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_core::{
    AutomationRule, BrokerPosition, OcoGroupId, OrderType, PositionDirection, RuleStatus,
    RuleType, Side, TimeInForce, TriggerType,
};

use crate::error::{Error, Result};

/// Manual rule creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    pub rule_type: RuleType,
    pub trigger_type: TriggerType,
    pub trigger_value: Decimal,
    pub order_side: Side,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    pub quantity: Decimal,
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    #[serde(default = "default_time_in_force")]
    pub time_in_force: TimeInForce,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_order_type() -> OrderType {
    OrderType::Market
}

fn default_time_in_force() -> TimeInForce {
    TimeInForce::Gtc
}

/// Stop or target distance, in percent of entry or per-share dollars
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitLeg {
    pub amount: Decimal,
    pub is_percent: bool,
}

impl ExitLeg {
    pub fn percent(amount: Decimal) -> Self {
        Self {
            amount,
            is_percent: true,
        }
    }

    pub fn dollars(amount: Decimal) -> Self {
        Self {
            amount,
            is_percent: false,
        }
    }
}

/// Stop-loss / take-profit / trailing stop for an existing position in one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickSetup {
    pub symbol: String,
    /// Defaults to the size of the live position
    #[serde(default)]
    pub quantity: Option<Decimal>,
    /// Defaults to the live position's average entry
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    /// Defaults to the live position's direction, else long
    #[serde(default)]
    pub direction: Option<PositionDirection>,
    #[serde(default)]
    pub stop_loss: Option<ExitLeg>,
    #[serde(default)]
    pub take_profit: Option<ExitLeg>,
    #[serde(default)]
    pub trailing_stop_percent: Option<Decimal>,
}

/// Bracketing stop-loss and take-profit prices around an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcoRequest {
    pub symbol: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// The two legs of a one-cancels-other group
#[derive(Debug, Clone, PartialEq)]
pub struct OcoPair {
    pub group_id: OcoGroupId,
    pub take_profit: AutomationRule,
    pub stop_loss: AutomationRule,
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Validation(message.into())
}

fn require_positive(field: &str, value: Decimal) -> Result<()> {
    if value <= Decimal::ZERO {
        return Err(invalid(format!("{field} must be positive, got {value}")));
    }
    Ok(())
}

fn require_symbol(symbol: &str) -> Result<String> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(invalid("symbol is required"));
    }
    Ok(symbol.to_uppercase())
}

/// Live position for `symbol`, ignoring flat or foreign positions
fn live_position<'a>(
    symbol: &str,
    position: Option<&'a BrokerPosition>,
) -> Option<&'a BrokerPosition> {
    position.filter(|p| p.symbol.eq_ignore_ascii_case(symbol) && !p.qty.is_zero())
}

/// Validate and build a manually specified rule
pub fn build_rule(
    request: NewRule,
    position: Option<&BrokerPosition>,
    now: DateTime<Utc>,
) -> Result<AutomationRule> {
    let symbol = require_symbol(&request.symbol)?;
    require_positive("trigger value", request.trigger_value)?;
    require_positive("quantity", request.quantity)?;

    let position = live_position(&symbol, position);
    if let Some(entry) = request.entry_price {
        require_positive("entry price", entry)?;
    }
    if request.trigger_type.needs_entry_price()
        && request.entry_price.is_none()
        && position.is_none()
    {
        return Err(invalid(format!(
            "{:?} trigger needs an entry price or an open position in {symbol}",
            request.trigger_type
        )));
    }

    let needs_limit =
        request.order_type.requires_limit_price() || request.rule_type == RuleType::LimitOrder;
    match request.limit_price {
        None if needs_limit => return Err(invalid("limit orders require a limit price")),
        Some(price) => require_positive("limit price", price)?,
        None => {}
    }
    let order_type = if request.rule_type == RuleType::LimitOrder {
        OrderType::Limit
    } else {
        request.order_type
    };
    if order_type.requires_stop_price() {
        return Err(invalid("rules place market or limit orders"));
    }

    if request.rule_type == RuleType::TrailingStop && !request.trigger_type.is_loss() {
        return Err(invalid("trailing stops use a percent or dollar loss trigger"));
    }
    if let Some(expiry) = request.expires_at
        && expiry <= now
    {
        return Err(invalid(format!("expiry {expiry} is not in the future")));
    }

    let high_water_mark = (request.rule_type == RuleType::TrailingStop)
        .then(|| {
            position
                .map(|p| p.current_price)
                .filter(|p| *p > Decimal::ZERO)
                .or(request.entry_price)
                .or_else(|| position.map(|p| p.avg_entry_price))
        })
        .flatten();

    let name = request
        .name
        .unwrap_or_else(|| default_name(request.rule_type, &symbol));

    Ok(AutomationRule {
        id: Uuid::new_v4(),
        symbol,
        name,
        rule_type: request.rule_type,
        trigger_type: request.trigger_type,
        trigger_value: request.trigger_value,
        order_side: request.order_side,
        order_type,
        quantity: request.quantity,
        limit_price: request.limit_price,
        time_in_force: request.time_in_force,
        oco_group_id: None,
        entry_price: request.entry_price,
        high_water_mark,
        plan_id: None,
        status: RuleStatus::Active,
        created_at: now,
        updated_at: now,
        triggered_at: None,
        expires_at: request.expires_at,
    })
}

fn default_name(rule_type: RuleType, symbol: &str) -> String {
    let kind = match rule_type {
        RuleType::LimitOrder => "Limit order",
        RuleType::StopLoss => "Stop loss",
        RuleType::TakeProfit => "Take profit",
        RuleType::Oco => "OCO",
        RuleType::TrailingStop => "Trailing stop",
    };
    format!("{kind} {symbol}")
}

/// Build the exit rules of a quick setup
///
/// Two or more exits share one OCO group so only one of them executes.
pub fn build_quick_setup(
    setup: QuickSetup,
    position: Option<&BrokerPosition>,
    now: DateTime<Utc>,
) -> Result<Vec<AutomationRule>> {
    let symbol = require_symbol(&setup.symbol)?;
    let position = live_position(&symbol, position);

    if setup.stop_loss.is_none() && setup.take_profit.is_none() && setup.trailing_stop_percent.is_none() {
        return Err(invalid("quick setup needs a stop loss, take profit or trailing stop"));
    }

    let direction = setup
        .direction
        .or_else(|| position.map(|p| p.direction()))
        .unwrap_or(PositionDirection::Long);
    let quantity = setup
        .quantity
        .or_else(|| position.map(|p| p.qty.abs()))
        .ok_or_else(|| invalid(format!("quantity is required without an open position in {symbol}")))?;
    let entry = setup
        .entry_price
        .or_else(|| position.map(|p| p.avg_entry_price))
        .ok_or_else(|| invalid(format!("entry price is required without an open position in {symbol}")))?;
    require_positive("entry price", entry)?;

    let exit = |rule_type, trigger_type, value| NewRule {
        symbol: symbol.clone(),
        name: None,
        rule_type,
        trigger_type,
        trigger_value: value,
        order_side: direction.closing_side(),
        order_type: OrderType::Market,
        quantity,
        limit_price: None,
        time_in_force: TimeInForce::Gtc,
        entry_price: Some(entry),
        expires_at: None,
    };

    let mut requests = Vec::new();
    if let Some(leg) = setup.stop_loss {
        let trigger = if leg.is_percent {
            TriggerType::PercentLoss
        } else {
            TriggerType::DollarLoss
        };
        requests.push(exit(RuleType::StopLoss, trigger, leg.amount));
    }
    if let Some(leg) = setup.take_profit {
        let trigger = if leg.is_percent {
            TriggerType::PercentGain
        } else {
            TriggerType::DollarGain
        };
        requests.push(exit(RuleType::TakeProfit, trigger, leg.amount));
    }
    if let Some(trail) = setup.trailing_stop_percent {
        requests.push(exit(RuleType::TrailingStop, TriggerType::PercentLoss, trail));
    }

    let mut rules = requests
        .into_iter()
        .map(|r| build_rule(r, position, now))
        .collect::<Result<Vec<_>>>()?;

    if rules.len() > 1 {
        let group = Uuid::new_v4();
        for rule in &mut rules {
            rule.oco_group_id = Some(group);
        }
    }
    Ok(rules)
}

/// Build the take-profit and stop-loss legs of an OCO pair
///
/// The position direction follows from where the take-profit sits relative
/// to entry; the stop must sit on the other side.
pub fn build_oco(request: OcoRequest, now: DateTime<Utc>) -> Result<OcoPair> {
    let symbol = require_symbol(&request.symbol)?;
    require_positive("quantity", request.quantity)?;
    require_positive("entry price", request.entry_price)?;
    require_positive("stop loss price", request.stop_loss_price)?;
    require_positive("take profit price", request.take_profit_price)?;

    let entry = request.entry_price;
    let direction = if request.take_profit_price > entry {
        PositionDirection::Long
    } else if request.take_profit_price < entry {
        PositionDirection::Short
    } else {
        return Err(invalid("take profit price equals entry price"));
    };
    if !direction.is_favourable(entry, request.stop_loss_price) {
        return Err(invalid(format!(
            "stop loss {} must be on the losing side of entry {} for a {:?} position",
            request.stop_loss_price, entry, direction
        )));
    }
    if let Some(expiry) = request.expires_at
        && expiry <= now
    {
        return Err(invalid(format!("expiry {expiry} is not in the future")));
    }

    let (profit_trigger, loss_trigger) = match direction {
        PositionDirection::Long => (TriggerType::PriceAbove, TriggerType::PriceBelow),
        PositionDirection::Short => (TriggerType::PriceBelow, TriggerType::PriceAbove),
    };
    let group_id = Uuid::new_v4();
    let leg = |name: &str, trigger_type, trigger_value| AutomationRule {
        id: Uuid::new_v4(),
        symbol: symbol.clone(),
        name: format!("OCO {name} {symbol}"),
        rule_type: RuleType::Oco,
        trigger_type,
        trigger_value,
        order_side: direction.closing_side(),
        order_type: OrderType::Market,
        quantity: request.quantity,
        limit_price: None,
        time_in_force: TimeInForce::Gtc,
        oco_group_id: Some(group_id),
        entry_price: Some(entry),
        high_water_mark: None,
        plan_id: None,
        status: RuleStatus::Active,
        created_at: now,
        updated_at: now,
        triggered_at: None,
        expires_at: request.expires_at,
    };

    Ok(OcoPair {
        group_id,
        take_profit: leg("take profit", profit_trigger, request.take_profit_price),
        stop_loss: leg("stop loss", loss_trigger, request.stop_loss_price),
    })
}
