//! Plan construction, validation and the pure tick decision

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_core::{ExitTarget, PlanStatus, PositionDirection, ScaledExitPlan, TrailingLeg};

use crate::error::{Error, Result};

/// One requested target: sell `quantity_percent` of the position at `target_percent` profit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub target_percent: Decimal,
    pub quantity_percent: Decimal,
}

impl TargetSpec {
    pub fn new(target_percent: Decimal, quantity_percent: Decimal) -> Self {
        Self {
            target_percent,
            quantity_percent,
        }
    }
}

/// Requested trailing take-profit leg
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingSpec {
    pub activation_percent: Decimal,
    pub trail_percent: Decimal,
}

impl TrailingSpec {
    pub fn new(activation_percent: Decimal, trail_percent: Decimal) -> Self {
        Self {
            activation_percent,
            trail_percent,
        }
    }
}

/// Plan creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlan {
    pub symbol: String,
    pub entry_price: Decimal,
    pub total_quantity: Decimal,
    #[serde(default)]
    pub direction: Option<PositionDirection>,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
    #[serde(default)]
    pub trailing: Option<TrailingSpec>,
}

/// Retune request for an active plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanUpdate {
    /// Replaces (or adds) the trailing leg
    pub trailing: Option<TrailingSpec>,
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Validation(message.into())
}

fn validate_trailing(spec: &TrailingSpec) -> Result<()> {
    if spec.activation_percent <= Decimal::ZERO {
        return Err(invalid("trailing activation percent must be positive"));
    }
    if spec.trail_percent <= Decimal::ZERO || spec.trail_percent >= Decimal::ONE_HUNDRED {
        return Err(invalid("trail percent must be between 0 and 100"));
    }
    Ok(())
}

/// Quantity-percent budget: at most 100, strictly less when a trailing leg
/// needs a remainder
fn validate_budget(allocated: Decimal, has_trailing: bool) -> Result<()> {
    if allocated > Decimal::ONE_HUNDRED {
        return Err(invalid(format!(
            "target quantities sum to {allocated}%, more than 100%"
        )));
    }
    if has_trailing && allocated >= Decimal::ONE_HUNDRED {
        return Err(invalid(
            "target quantities leave nothing for the trailing leg",
        ));
    }
    Ok(())
}

/// Validate a request and build the plan it describes
pub fn build_plan(request: NewPlan, now: DateTime<Utc>) -> Result<ScaledExitPlan> {
    let symbol = request.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(invalid("symbol is required"));
    }
    if request.entry_price <= Decimal::ZERO {
        return Err(invalid("entry price must be positive"));
    }
    if request.total_quantity <= Decimal::ZERO {
        return Err(invalid("total quantity must be positive"));
    }
    if request.targets.is_empty() && request.trailing.is_none() {
        return Err(invalid("a plan needs at least one target or a trailing leg"));
    }

    for target in &request.targets {
        if target.target_percent <= Decimal::ZERO || target.quantity_percent <= Decimal::ZERO {
            return Err(invalid("target and quantity percents must be positive"));
        }
    }
    if request
        .targets
        .windows(2)
        .any(|pair| pair[1].target_percent <= pair[0].target_percent)
    {
        return Err(invalid("target percents must be strictly ascending"));
    }
    let allocated: Decimal = request.targets.iter().map(|t| t.quantity_percent).sum();
    validate_budget(allocated, request.trailing.is_some())?;
    if let Some(spec) = &request.trailing {
        validate_trailing(spec)?;
    }

    Ok(ScaledExitPlan {
        id: Uuid::new_v4(),
        symbol,
        direction: request.direction.unwrap_or(PositionDirection::Long),
        entry_price: request.entry_price,
        total_quantity: request.total_quantity,
        remaining_quantity: request.total_quantity,
        targets: request
            .targets
            .iter()
            .map(|t| ExitTarget::new(t.target_percent, t.quantity_percent))
            .collect(),
        trailing: request
            .trailing
            .map(|t| TrailingLeg::new(t.activation_percent, t.trail_percent)),
        status: PlanStatus::Active,
        created_at: now,
        updated_at: now,
        completed_at: None,
    })
}

/// Apply a retune to an active plan, keeping an armed leg's state
pub fn apply_update(plan: &mut ScaledExitPlan, update: &PlanUpdate, now: DateTime<Utc>) -> Result<()> {
    let Some(spec) = update.trailing else {
        return Err(invalid("update changes nothing"));
    };
    validate_trailing(&spec)?;
    validate_budget(plan.allocated_percent(), true)?;

    match plan.trailing.as_mut() {
        Some(leg) if leg.triggered => {
            return Err(invalid("trailing leg has already fired"));
        }
        Some(leg) => {
            leg.activation_percent = spec.activation_percent;
            leg.trail_percent = spec.trail_percent;
        }
        None => {
            plan.trailing = Some(TrailingLeg::new(spec.activation_percent, spec.trail_percent));
        }
    }
    plan.updated_at = now;
    Ok(())
}

/// One action a tick takes on a plan
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Sell a target's share of the position
    ExitTarget { index: usize, quantity: Decimal },
    /// Arm the trailing leg (latching), starting its mark at the price
    ActivateTrailing,
    /// Move the armed leg's high-water mark to the price
    RaiseHighWaterMark,
    /// Sell everything left once price retraced to the stop
    ExitTrailing { stop_price: Decimal },
}

/// Steps the plan takes at `price`, in the order they must be applied
///
/// Pure: the plan is not modified.
pub fn evaluate(plan: &ScaledExitPlan, price: Decimal) -> Vec<PlanStep> {
    let mut steps = Vec::new();
    if !plan.is_active() {
        return steps;
    }
    let Some(profit) = plan.profit_pct(price) else {
        return steps;
    };

    // With no trailing leg a fully allocated plan's last target takes
    // whatever flooring left behind
    let sweeps_remainder =
        plan.trailing.is_none() && plan.allocated_percent() == Decimal::ONE_HUNDRED;
    let last = plan.targets.len().saturating_sub(1);

    let mut remaining = plan.remaining_quantity;
    for (index, target) in plan.targets.iter().enumerate() {
        if target.triggered || profit < target.target_percent {
            continue;
        }
        let quantity = if sweeps_remainder && index == last {
            remaining
        } else {
            plan.target_quantity(target)
        };
        if quantity > Decimal::ZERO && quantity <= remaining {
            steps.push(PlanStep::ExitTarget { index, quantity });
            remaining -= quantity;
        }
    }

    if let Some(leg) = plan.trailing.as_ref().filter(|l| !l.triggered) {
        let mut armed = leg.clone();
        if !armed.activated {
            if profit >= armed.activation_percent {
                steps.push(PlanStep::ActivateTrailing);
                armed.activated = true;
                armed.high_water_mark = Some(price);
            }
        } else if armed
            .high_water_mark
            .is_none_or(|mark| plan.direction.is_favourable(price, mark))
        {
            steps.push(PlanStep::RaiseHighWaterMark);
            armed.high_water_mark = Some(price);
        }

        if armed.activated
            && remaining > Decimal::ZERO
            && let Some(stop_price) = armed.stop_price(plan.direction)
            && !plan.direction.is_favourable(price, stop_price)
        {
            steps.push(PlanStep::ExitTrailing { stop_price });
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> NewPlan {
        NewPlan {
            symbol: "aapl".to_string(),
            entry_price: dec!(100),
            total_quantity: dec!(100),
            direction: None,
            targets: vec![TargetSpec::new(dec!(5), dec!(50)), TargetSpec::new(dec!(10), dec!(30))],
            trailing: Some(TrailingSpec::new(dec!(15), dec!(2))),
        }
    }

    #[test]
    fn test_rejects_descending_targets() {
        let mut request = request();
        request.targets.reverse();
        assert!(matches!(build_plan(request, Utc::now()), Err(Error::Validation(_))));
    }

    #[test]
    fn test_rejects_equal_targets() {
        let mut request = request();
        request.targets[1].target_percent = dec!(5);
        assert!(build_plan(request, Utc::now()).is_err());
    }

    #[test]
    fn test_budget_reserves_remainder_for_trailing() {
        let mut request = request();
        request.targets[1].quantity_percent = dec!(50);
        assert!(build_plan(request.clone(), Utc::now()).is_err());

        request.trailing = None;
        assert!(build_plan(request.clone(), Utc::now()).is_ok());

        request.targets[1].quantity_percent = dec!(51);
        assert!(build_plan(request, Utc::now()).is_err());
    }

    #[test]
    fn test_needs_target_or_trailing() {
        let mut request = request();
        request.targets.clear();
        assert!(build_plan(request.clone(), Utc::now()).is_ok());

        request.trailing = None;
        assert!(build_plan(request, Utc::now()).is_err());
    }

    #[test]
    fn test_evaluate_crosses_several_targets_at_once() {
        let plan = build_plan(request(), Utc::now()).unwrap();
        assert_eq!(plan.symbol, "AAPL");

        let steps = evaluate(&plan, dec!(112));
        assert_eq!(
            steps,
            vec![
                PlanStep::ExitTarget { index: 0, quantity: dec!(50) },
                PlanStep::ExitTarget { index: 1, quantity: dec!(30) },
            ]
        );
        assert!(evaluate(&plan, dec!(104)).is_empty());
    }

    #[test]
    fn test_last_target_sells_floor_remainder_without_trailing() {
        let mut request = request();
        request.total_quantity = dec!(3);
        request.targets[1].quantity_percent = dec!(50);
        request.trailing = None;
        let mut plan = build_plan(request, Utc::now()).unwrap();

        assert_eq!(evaluate(&plan, dec!(106)), vec![PlanStep::ExitTarget { index: 0, quantity: dec!(1) }]);
        assert_eq!(
            evaluate(&plan, dec!(112)),
            vec![
                PlanStep::ExitTarget { index: 0, quantity: dec!(1) },
                PlanStep::ExitTarget { index: 1, quantity: dec!(2) },
            ]
        );

        plan.targets[0].triggered = true;
        plan.remaining_quantity = dec!(2);
        assert_eq!(evaluate(&plan, dec!(111)), vec![PlanStep::ExitTarget { index: 1, quantity: dec!(2) }]);
    }

    #[test]
    fn test_evaluate_trailing_leg() {
        let mut plan = build_plan(request(), Utc::now()).unwrap();
        for target in &mut plan.targets {
            target.triggered = true;
        }
        plan.remaining_quantity = dec!(20);

        assert_eq!(evaluate(&plan, dec!(118)), vec![PlanStep::ActivateTrailing]);

        if let Some(leg) = plan.trailing.as_mut() {
            leg.activated = true;
            leg.high_water_mark = Some(dec!(118));
        }
        assert!(evaluate(&plan, dec!(116)).is_empty());
        assert_eq!(
            evaluate(&plan, dec!(115.5)),
            vec![PlanStep::ExitTrailing { stop_price: dec!(115.64) }]
        );
        assert_eq!(evaluate(&plan, dec!(120)), vec![PlanStep::RaiseHighWaterMark]);
    }

    #[test]
    fn test_short_plan_profits_on_decline() {
        let mut request = request();
        request.direction = Some(PositionDirection::Short);
        let plan = build_plan(request, Utc::now()).unwrap();

        assert_eq!(
            evaluate(&plan, dec!(94)),
            vec![PlanStep::ExitTarget { index: 0, quantity: dec!(50) }]
        );
        assert!(evaluate(&plan, dec!(106)).is_empty());
    }

    #[test]
    fn test_zero_share_target_is_skipped() {
        let mut request = request();
        request.total_quantity = dec!(1);
        let plan = build_plan(request, Utc::now()).unwrap();

        // floor(1 * 30%) = 0 shares; floor(1 * 50%) = 0 shares
        assert!(evaluate(&plan, dec!(112)).is_empty());
    }

    #[test]
    fn test_update_keeps_armed_state() {
        let mut plan = build_plan(request(), Utc::now()).unwrap();
        if let Some(leg) = plan.trailing.as_mut() {
            leg.activated = true;
            leg.high_water_mark = Some(dec!(118));
        }

        let update = PlanUpdate {
            trailing: Some(TrailingSpec::new(dec!(20), dec!(3))),
        };
        apply_update(&mut plan, &update, Utc::now()).unwrap();

        let leg = plan.trailing.as_ref().unwrap();
        assert_eq!(leg.trail_percent, dec!(3));
        assert!(leg.activated);
        assert_eq!(leg.high_water_mark, Some(dec!(118)));
        assert!(apply_update(&mut plan, &PlanUpdate::default(), Utc::now()).is_err());
    }
}
