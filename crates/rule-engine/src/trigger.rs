//! Trigger Evaluator
//!
//! Pure functions deciding whether a rule fires. Gain and loss are measured
//! through the rule's [`PositionDirection`], so a long position gains when
//! price rises and a short position gains when price falls.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use vigil_core::{AutomationRule, BrokerPosition, PositionDirection, RuleType, TriggerType};

/// Reference price that percent/dollar triggers are measured from
///
/// Trailing stops measure from their high-water mark. Other rules use their
/// own entry price, falling back to the live position's average entry.
pub fn reference_price(rule: &AutomationRule, position: Option<&BrokerPosition>) -> Option<Decimal> {
    if rule.rule_type == RuleType::TrailingStop
        && let Some(mark) = rule.high_water_mark
    {
        return Some(mark).filter(|m| *m > Decimal::ZERO);
    }
    rule.entry_price
        .or_else(|| position_entry(rule, position))
        .filter(|p| *p > Decimal::ZERO)
}

fn position_entry(rule: &AutomationRule, position: Option<&BrokerPosition>) -> Option<Decimal> {
    position
        .filter(|p| p.symbol.eq_ignore_ascii_case(&rule.symbol) && !p.qty.is_zero())
        .map(|p| p.avg_entry_price)
}

/// Does the rule's condition hold at `price`?
///
/// Percent and dollar triggers never fire without a reference price.
pub fn fires(rule: &AutomationRule, price: Decimal, position: Option<&BrokerPosition>) -> bool {
    let value = rule.trigger_value;
    match rule.trigger_type {
        TriggerType::PriceAbove => price >= value,
        TriggerType::PriceBelow => price <= value,
        trigger => {
            let Some(reference) = reference_price(rule, position) else {
                return false;
            };
            let gain = rule.direction().signed_gain(reference, price);
            match trigger {
                TriggerType::PercentGain => gain / reference * Decimal::ONE_HUNDRED >= value,
                TriggerType::PercentLoss => -gain / reference * Decimal::ONE_HUNDRED >= value,
                TriggerType::DollarGain => gain >= value,
                TriggerType::DollarLoss => -gain >= value,
                TriggerType::PriceAbove | TriggerType::PriceBelow => false,
            }
        }
    }
}

/// [`fires`], plus inactive and expired rules never firing
pub fn fires_at(
    rule: &AutomationRule,
    price: Decimal,
    position: Option<&BrokerPosition>,
    now: DateTime<Utc>,
) -> bool {
    rule.is_active() && !is_expired(rule, now) && fires(rule, price, position)
}

pub fn is_expired(rule: &AutomationRule, now: DateTime<Utc>) -> bool {
    rule.is_expired(now)
}

/// Concrete price at which the rule fires, given its reference price
pub fn trigger_price(rule: &AutomationRule, reference: Option<Decimal>) -> Option<Decimal> {
    let value = rule.trigger_value;
    let direction = rule.direction();
    match rule.trigger_type {
        TriggerType::PriceAbove | TriggerType::PriceBelow => Some(value),
        TriggerType::PercentGain => {
            reference.map(|r| direction.price_after_gain(r, r * value / Decimal::ONE_HUNDRED))
        }
        TriggerType::PercentLoss => {
            reference.map(|r| direction.price_after_loss(r, r * value / Decimal::ONE_HUNDRED))
        }
        TriggerType::DollarGain => reference.map(|r| direction.price_after_gain(r, value)),
        TriggerType::DollarLoss => reference.map(|r| direction.price_after_loss(r, value)),
    }
}

/// [`trigger_price`] with the reference resolved from the rule and position
pub fn resolved_trigger_price(
    rule: &AutomationRule,
    position: Option<&BrokerPosition>,
) -> Option<Decimal> {
    trigger_price(rule, reference_price(rule, position))
}

/// Move a trailing stop's high-water mark toward a better price
///
/// Returns true if the mark moved. Non-trailing rules are left untouched.
pub fn ratchet(rule: &mut AutomationRule, price: Decimal) -> bool {
    if rule.rule_type != RuleType::TrailingStop || price <= Decimal::ZERO {
        return false;
    }
    let direction: PositionDirection = rule.direction();
    match rule.high_water_mark {
        Some(mark) if !direction.is_favourable(price, mark) => false,
        _ => {
            rule.high_water_mark = Some(price);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;
    use vigil_core::{OrderType, RuleStatus, Side, TimeInForce};

    fn rule(trigger_type: TriggerType, value: Decimal, side: Side) -> AutomationRule {
        let now = Utc::now();
        AutomationRule {
            id: Uuid::new_v4(),
            symbol: "AAPL".to_string(),
            name: "test".to_string(),
            rule_type: RuleType::StopLoss,
            trigger_type,
            trigger_value: value,
            order_side: side,
            order_type: OrderType::Market,
            quantity: dec!(10),
            limit_price: None,
            time_in_force: TimeInForce::Gtc,
            oco_group_id: None,
            entry_price: Some(dec!(150)),
            high_water_mark: None,
            plan_id: None,
            status: RuleStatus::Active,
            created_at: now,
            updated_at: now,
            triggered_at: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_price_triggers() {
        let above = rule(TriggerType::PriceAbove, dec!(160), Side::Sell);
        assert!(fires(&above, dec!(160), None));
        assert!(!fires(&above, dec!(159.99), None));

        let below = rule(TriggerType::PriceBelow, dec!(140), Side::Sell);
        assert!(fires(&below, dec!(140), None));
        assert!(!fires(&below, dec!(141), None));
    }

    #[test]
    fn test_percent_loss_long() {
        let stop = rule(TriggerType::PercentLoss, dec!(5), Side::Sell);
        assert_eq!(resolved_trigger_price(&stop, None), Some(dec!(142.5)));
        assert!(fires(&stop, dec!(142.5), None));
        assert!(!fires(&stop, dec!(143), None));
        assert!(!fires(&stop, dec!(170), None));
    }

    #[test]
    fn test_percent_loss_short_is_inverted() {
        // Buy-to-cover closes a short, which loses when price rises
        let stop = rule(TriggerType::PercentLoss, dec!(5), Side::Buy);
        assert_eq!(resolved_trigger_price(&stop, None), Some(dec!(157.5)));
        assert!(fires(&stop, dec!(158), None));
        assert!(!fires(&stop, dec!(140), None));
    }

    #[test]
    fn test_dollar_gain_both_directions() {
        let long = rule(TriggerType::DollarGain, dec!(10), Side::Sell);
        assert!(fires(&long, dec!(160), None));
        assert!(!fires(&long, dec!(140), None));

        let short = rule(TriggerType::DollarGain, dec!(10), Side::Buy);
        assert!(fires(&short, dec!(140), None));
        assert!(!fires(&short, dec!(160), None));
        assert_eq!(resolved_trigger_price(&short, None), Some(dec!(140)));
    }

    #[test]
    fn test_entry_falls_back_to_position() {
        let mut stop = rule(TriggerType::DollarLoss, dec!(5), Side::Sell);
        stop.entry_price = None;
        assert!(!fires(&stop, dec!(1), None));

        let position = BrokerPosition::new("AAPL", dec!(10), dec!(100), dec!(94));
        assert!(fires(&stop, dec!(94), Some(&position)));

        let other = BrokerPosition::new("MSFT", dec!(10), dec!(100), dec!(94));
        assert!(!fires(&stop, dec!(94), Some(&other)));
    }

    #[test]
    fn test_expired_rule_never_fires() {
        let mut stop = rule(TriggerType::PriceBelow, dec!(140), Side::Sell);
        let now = Utc::now();
        stop.expires_at = Some(now - Duration::minutes(1));

        assert!(fires(&stop, dec!(100), None));
        assert!(!fires_at(&stop, dec!(100), None, now));
    }

    #[test]
    fn test_trailing_stop_ratchets_only_upward_for_long() {
        let mut trail = rule(TriggerType::PercentLoss, dec!(2), Side::Sell);
        trail.rule_type = RuleType::TrailingStop;
        trail.high_water_mark = Some(dec!(150));

        assert!(ratchet(&mut trail, dec!(160)));
        assert!(!ratchet(&mut trail, dec!(155)));
        assert_eq!(trail.high_water_mark, Some(dec!(160)));
        assert_eq!(resolved_trigger_price(&trail, None), Some(dec!(156.8)));
        assert!(fires(&trail, dec!(156.8), None));
        assert!(!fires(&trail, dec!(157), None));
    }

    #[test]
    fn test_trailing_stop_short_tracks_lows() {
        let mut trail = rule(TriggerType::DollarLoss, dec!(3), Side::Buy);
        trail.rule_type = RuleType::TrailingStop;
        trail.high_water_mark = Some(dec!(150));

        assert!(ratchet(&mut trail, dec!(140)));
        assert!(!ratchet(&mut trail, dec!(145)));
        assert!(fires(&trail, dec!(143), None));
        assert!(!fires(&trail, dec!(142), None));
    }
}
