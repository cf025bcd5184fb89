use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::{debug, warn};

use super::{LegKind, OrderLeg};
use crate::assets::{AssetFormatRules, MAX_QUANTITY, MIN_NOTIONAL_USD};
use crate::signal::{EntryType, TargetPrice, TpLeg, TradeSignal};

const DEFAULT_TP_FRACTION: Decimal = dec!(0.25);

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("quantity {quantity} is below minimum size {min} for {symbol}")]
    BelowMinSize {
        symbol: String,
        quantity: Decimal,
        min: Decimal,
    },
    #[error("quantity {0} exceeds the maximum of {MAX_QUANTITY}")]
    AboveMaxSize(Decimal),
    #[error("entry quantity truncates to zero")]
    ZeroQuantity,
}

/// Turn a parsed signal into the ordered leg sequence ENTRY, STOP, TP1..TP4.
///
/// The ordering is load-bearing: the executor places the entry first and uses
/// its fill price to resolve percent-based TP targets. A broken entry aborts
/// the whole plan; broken optional legs are skipped with a diagnostic.
pub fn plan(signal: &TradeSignal, rules: &AssetFormatRules) -> Result<Vec<OrderLeg>, PlanError> {
    let quantity = rules.truncate_size(signal.quantity);
    if quantity.is_zero() {
        return Err(PlanError::ZeroQuantity);
    }
    let min = rules.min_size();
    if quantity < min {
        return Err(PlanError::BelowMinSize {
            symbol: signal.symbol.clone(),
            quantity,
            min,
        });
    }
    if quantity > MAX_QUANTITY {
        return Err(PlanError::AboveMaxSize(quantity));
    }

    let mut legs = Vec::with_capacity(2 + signal.take_profits.len());

    let entry_price = match signal.entry_type {
        EntryType::Market => None,
        // Parser guarantees a limit price for LIMIT entries.
        EntryType::Limit => signal.limit_price.map(|p| rules.round_to_tick(p)),
    };
    legs.push(OrderLeg {
        kind: LegKind::Entry,
        side: signal.side,
        size: quantity,
        price: entry_price,
        trigger: None,
        reduce_only: false,
        client_tag: "entry".into(),
    });

    if let Some(stop) = signal.stop_price {
        legs.push(OrderLeg {
            kind: LegKind::Stop,
            side: signal.side.exit(),
            size: quantity,
            price: None,
            trigger: Some(TargetPrice::Absolute(rules.format_trigger_price(stop))),
            reduce_only: true,
            client_tag: "stop".into(),
        });
    }

    for tp in &signal.take_profits {
        if let Some(leg) = plan_tp_leg(tp, signal, quantity, rules) {
            legs.push(leg);
        }
    }

    Ok(legs)
}

fn plan_tp_leg(
    tp: &TpLeg,
    signal: &TradeSignal,
    entry_quantity: Decimal,
    rules: &AssetFormatRules,
) -> Option<OrderLeg> {
    let symbol = signal.symbol.as_str();
    let index = tp.index;

    let Some(target) = tp.target else {
        debug!(symbol, index, "tp_leg_dropped_no_target");
        return None;
    };

    let size = match tp.size {
        Some(explicit) => {
            let truncated = rules.truncate_size(explicit);
            if truncated.is_zero() {
                if index == 4 {
                    // TP4 is the complete exit: fall back to the whole
                    // position rather than dropping the closing leg.
                    warn!(symbol, %explicit, "tp4_size_truncated_to_zero_using_full_quantity");
                    entry_quantity
                } else {
                    warn!(symbol, index, %explicit, "tp_leg_skipped_zero_size");
                    return None;
                }
            } else {
                truncated
            }
        }
        None if index == 4 => entry_quantity,
        None => {
            let default = rules.truncate_size(entry_quantity * DEFAULT_TP_FRACTION);
            if default.is_zero() {
                warn!(symbol, index, "tp_leg_skipped_default_size_zero");
                return None;
            }
            default
        }
    };

    // Absolute targets can be dust-checked now; percent targets wait for the
    // entry fill price and are checked at execution time.
    let trigger = match target {
        TargetPrice::Absolute(price) => {
            let formatted = rules.format_trigger_price(price);
            if !rules.meets_notional_floor(size, formatted) {
                warn!(
                    symbol, index, %size, price = %formatted,
                    notional = %(size * formatted),
                    min = %MIN_NOTIONAL_USD,
                    "tp_leg_skipped_below_notional_floor"
                );
                return None;
            }
            TargetPrice::Absolute(formatted)
        }
        percent @ TargetPrice::PercentFromEntry(_) => percent,
    };

    Some(OrderLeg {
        kind: LegKind::Tp(index),
        side: signal.side.exit(),
        size,
        price: None,
        trigger: Some(trigger),
        reduce_only: true,
        client_tag: format!("tp{index}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Side;

    fn sol_rules() -> AssetFormatRules {
        AssetFormatRules::from_metadata("SOL", 2)
    }

    fn market_signal(quantity: Decimal) -> TradeSignal {
        TradeSignal {
            strategy_id: "OTHERS".into(),
            symbol: "SOL".into(),
            side: Side::Buy,
            entry_type: EntryType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            take_profits: Vec::new(),
        }
    }

    #[test]
    fn test_market_entry_only() {
        let legs = plan(&market_signal(dec!(12)), &sol_rules()).unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].kind, LegKind::Entry);
        assert_eq!(legs[0].size, dec!(12));
        assert!(legs[0].price.is_none());
        assert!(!legs[0].reduce_only);
    }

    #[test]
    fn test_limit_entry_price_snapped_to_tick() {
        let mut signal = market_signal(dec!(1));
        signal.entry_type = EntryType::Limit;
        signal.limit_price = Some(dec!(181.30));

        let legs = plan(&signal, &sol_rules()).unwrap();
        assert_eq!(legs[0].price, Some(dec!(181.50)));
    }

    #[test]
    fn test_stop_leg_is_reduce_only_opposite_side() {
        let mut signal = market_signal(dec!(2));
        signal.stop_price = Some(dec!(170.456));

        let legs = plan(&signal, &sol_rules()).unwrap();
        assert_eq!(legs.len(), 2);
        let stop = &legs[1];
        assert_eq!(stop.kind, LegKind::Stop);
        assert_eq!(stop.side, Side::Sell);
        assert_eq!(stop.size, dec!(2));
        assert!(stop.reduce_only);
        assert_eq!(
            stop.trigger,
            Some(TargetPrice::Absolute(dec!(170.46)))
        );
    }

    #[test]
    fn test_tp_with_explicit_size_truncated() {
        // 0.05 * 250 = $12.50 clears the notional floor.
        let rules = AssetFormatRules::from_metadata("XYZ", 3);
        let mut signal = market_signal(dec!(0.2));
        signal.take_profits = vec![TpLeg {
            index: 1,
            target: Some(TargetPrice::Absolute(dec!(250))),
            size: Some(dec!(0.05)),
        }];

        let legs = plan(&signal, &rules).unwrap();
        assert_eq!(legs.len(), 2);
        let tp = &legs[1];
        assert_eq!(tp.kind, LegKind::Tp(1));
        assert_eq!(tp.size, dec!(0.05));
        assert_eq!(tp.trigger, Some(TargetPrice::Absolute(dec!(250))));
        assert!(tp.reduce_only);
    }

    #[test]
    fn test_tp_just_under_notional_floor_is_skipped() {
        // 0.05 * 190 = $9.50, fifty cents short of the floor.
        let rules = AssetFormatRules::from_metadata("XYZ", 3);
        let mut signal = market_signal(dec!(0.2));
        signal.take_profits = vec![TpLeg {
            index: 1,
            target: Some(TargetPrice::Absolute(dec!(190))),
            size: Some(dec!(0.05)),
        }];

        let legs = plan(&signal, &rules).unwrap();
        assert_eq!(legs.len(), 1);
    }

    #[test]
    fn test_tp_zero_size_leg_never_emitted() {
        let rules = AssetFormatRules::from_metadata("XYZ", 1);
        let mut signal = market_signal(dec!(5));
        signal.take_profits = vec![TpLeg {
            index: 1,
            target: Some(TargetPrice::Absolute(dec!(190))),
            // Truncates to zero at 1 size decimal.
            size: Some(dec!(0.05)),
        }];

        let legs = plan(&signal, &rules).unwrap();
        assert_eq!(legs.len(), 1);
    }

    #[test]
    fn test_tp_dust_rejected() {
        let mut signal = market_signal(dec!(5));
        signal.take_profits = vec![TpLeg {
            index: 2,
            target: Some(TargetPrice::Absolute(dec!(50))),
            // 0.1 * 50 = $5, below the $10 floor.
            size: Some(dec!(0.1)),
        }];

        let legs = plan(&signal, &sol_rules()).unwrap();
        assert_eq!(legs.len(), 1);
    }

    #[test]
    fn test_tp_default_size_is_quarter_of_entry() {
        let mut signal = market_signal(dec!(8));
        signal.take_profits = vec![TpLeg {
            index: 2,
            target: Some(TargetPrice::Absolute(dec!(200))),
            size: None,
        }];

        let legs = plan(&signal, &sol_rules()).unwrap();
        assert_eq!(legs[1].size, dec!(2));
    }

    #[test]
    fn test_tp4_defaults_to_complete_exit() {
        let mut signal = market_signal(dec!(8));
        signal.take_profits = vec![TpLeg {
            index: 4,
            target: Some(TargetPrice::Absolute(dec!(200))),
            size: None,
        }];

        let legs = plan(&signal, &sol_rules()).unwrap();
        assert_eq!(legs[1].size, dec!(8));
    }

    #[test]
    fn test_tp_without_target_dropped_silently() {
        let mut signal = market_signal(dec!(8));
        signal.take_profits = vec![TpLeg {
            index: 3,
            target: None,
            size: Some(dec!(1)),
        }];

        let legs = plan(&signal, &sol_rules()).unwrap();
        assert_eq!(legs.len(), 1);
    }

    #[test]
    fn test_percent_target_passes_through_unresolved() {
        let mut signal = market_signal(dec!(8));
        signal.take_profits = vec![TpLeg {
            index: 1,
            target: Some(TargetPrice::PercentFromEntry(dec!(5))),
            size: Some(dec!(2)),
        }];

        let legs = plan(&signal, &sol_rules()).unwrap();
        assert_eq!(
            legs[1].trigger,
            Some(TargetPrice::PercentFromEntry(dec!(5)))
        );
    }

    #[test]
    fn test_quantity_below_min_size_fails() {
        let err = plan(&market_signal(dec!(0.05)), &sol_rules()).unwrap_err();
        assert!(matches!(err, PlanError::BelowMinSize { .. }));
    }

    #[test]
    fn test_quantity_above_max_fails() {
        let err = plan(&market_signal(dec!(1500)), &sol_rules()).unwrap_err();
        assert!(matches!(err, PlanError::AboveMaxSize(_)));
    }

    #[test]
    fn test_integer_price_policy_for_eth() {
        let rules = AssetFormatRules::from_metadata("ETH", 4);
        let mut signal = market_signal(dec!(1));
        signal.symbol = "ETH".into();
        signal.stop_price = Some(dec!(3421.66));
        signal.take_profits = vec![TpLeg {
            index: 1,
            target: Some(TargetPrice::Absolute(dec!(3600.4))),
            size: Some(dec!(0.5)),
        }];

        let legs = plan(&signal, &rules).unwrap();
        assert_eq!(legs[1].trigger, Some(TargetPrice::Absolute(dec!(3422))));
        assert_eq!(legs[2].trigger, Some(TargetPrice::Absolute(dec!(3600))));
    }
}
