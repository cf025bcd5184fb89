use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::strategy::{SignalDialect, StrategyRegistry, StrategyRule};

pub const DEFAULT_STRATEGY_ID: &str = "OTHERS";

// ---------------------------------------------------------------------------
// Canonical signal model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }

    /// The side of a reduce-only exit order for this entry side.
    pub fn exit(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Market,
    Limit,
}

/// A take-profit target: either an absolute price from the alert, or a
/// percentage offset that can only be resolved once the entry price is known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TargetPrice {
    Absolute(Decimal),
    PercentFromEntry(Decimal),
}

impl TargetPrice {
    /// Resolve to a concrete price. Percent targets sit above the entry for
    /// long exits and below it for short exits.
    pub fn resolve(&self, entry_side: Side, entry_price: Decimal) -> Decimal {
        match self {
            TargetPrice::Absolute(price) => *price,
            TargetPrice::PercentFromEntry(pct) => {
                let offset = entry_price * *pct / Decimal::ONE_HUNDRED;
                match entry_side {
                    Side::Buy => entry_price + offset,
                    Side::Sell => entry_price - offset,
                }
            }
        }
    }

    pub fn as_absolute(&self) -> Option<Decimal> {
        match self {
            TargetPrice::Absolute(price) => Some(*price),
            TargetPrice::PercentFromEntry(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TpLeg {
    pub index: u8,
    pub target: Option<TargetPrice>,
    /// Explicit exit size. Despite the wire name (`tp{n}_perc`) this is an
    /// absolute quantity, not a fraction.
    pub size: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub strategy_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_type: EntryType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub take_profits: Vec<TpLeg>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("missing or empty field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("quantity must be a positive number")]
    NonPositiveQuantity,
    #[error("limit entry requires a positive price")]
    MissingLimitPrice,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Normalize a raw webhook payload into a [`TradeSignal`].
///
/// The strategy id is auto-registered on first sight; the returned rule is
/// the registry's current view (so a disabled strategy comes back disabled).
pub async fn parse(
    payload: &Value,
    registry: &StrategyRegistry,
) -> Result<(TradeSignal, StrategyRule), ParseError> {
    let obj = payload.as_object().ok_or(ParseError::NotAnObject)?;

    let strategy_id = obj
        .get("strategy_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_STRATEGY_ID)
        .to_string();
    let rule = registry.ensure(&strategy_id).await;

    let symbol = obj
        .get("symbol")
        .and_then(Value::as_str)
        .map(str::to_uppercase)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingField("symbol"))?;

    let side = match obj.get("side").and_then(Value::as_str) {
        Some(s) if s.eq_ignore_ascii_case("buy") => Side::Buy,
        Some(s) if s.eq_ignore_ascii_case("sell") => Side::Sell,
        Some(other) => {
            return Err(ParseError::InvalidField {
                field: "side",
                value: other.to_string(),
            })
        }
        None => return Err(ParseError::MissingField("side")),
    };

    let entry_type = match obj.get("entry").and_then(Value::as_str) {
        None => EntryType::Market,
        Some(s) if s.eq_ignore_ascii_case("market") => EntryType::Market,
        Some(s) if s.eq_ignore_ascii_case("limit") => EntryType::Limit,
        Some(other) => {
            return Err(ParseError::InvalidField {
                field: "entry",
                value: other.to_string(),
            })
        }
    };

    let mut quantity = decimal_field(obj, "quantity")
        .filter(|q| *q > Decimal::ZERO)
        .ok_or(ParseError::NonPositiveQuantity)?;

    if quantity > rule.max_position_size {
        warn!(
            strategy_id,
            %quantity,
            max = %rule.max_position_size,
            "quantity_clamped"
        );
        quantity = rule.max_position_size;
    }

    let limit_price = decimal_field(obj, "price");
    if entry_type == EntryType::Limit && limit_price.is_none() {
        return Err(ParseError::MissingLimitPrice);
    }

    let (stop_price, take_profits) = match rule.dialect {
        SignalDialect::Trend => {
            // Trend alerts speak sl_price/tp_price and never carry TP2-4.
            let stop = decimal_field(obj, "sl_price").or_else(|| decimal_field(obj, "stop"));
            let tps = match decimal_field(obj, "tp_price") {
                Some(price) => vec![TpLeg {
                    index: 1,
                    target: Some(TargetPrice::Absolute(price)),
                    size: None,
                }],
                None => Vec::new(),
            };
            (stop, tps)
        }
        SignalDialect::MultiTarget => {
            let stop = decimal_field(obj, "stop");
            let mut tps = Vec::new();
            for index in 1u8..=4 {
                let price = decimal_field_owned(obj, format!("tp{index}_price"));
                let perc = decimal_field_owned(obj, format!("tp{index}_perc"));
                if price.is_none() && perc.is_none() {
                    continue;
                }
                // perc doubles as the exit size; it only becomes the target
                // when no absolute price was sent.
                let target = price
                    .map(TargetPrice::Absolute)
                    .or(perc.map(TargetPrice::PercentFromEntry));
                tps.push(TpLeg {
                    index,
                    target,
                    size: perc,
                });
            }
            (stop, tps)
        }
    };

    Ok((
        TradeSignal {
            strategy_id,
            symbol,
            side,
            entry_type,
            quantity,
            limit_price,
            stop_price,
            take_profits,
        },
        rule,
    ))
}

/// Read an optional positive decimal that may arrive as a JSON number or a
/// numeric string. Zero and negative values count as absent, matching the
/// alert templates that send 0 for "no value".
fn decimal_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<Decimal> {
    let value = obj.get(key)?;
    let parsed = match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(Decimal::from_f64)
            .map(|d| d.round_dp(8)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|d| *d > Decimal::ZERO)
}

fn decimal_field_owned(obj: &serde_json::Map<String, Value>, key: String) -> Option<Decimal> {
    decimal_field(obj, &key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    async fn parse_ok(payload: Value) -> TradeSignal {
        let registry = StrategyRegistry::new();
        parse(&payload, &registry).await.expect("should parse").0
    }

    #[tokio::test]
    async fn test_market_buy_minimal_payload() {
        let signal = parse_ok(json!({
            "symbol": "SOL", "side": "buy", "entry": "market", "quantity": 12
        }))
        .await;
        assert_eq!(signal.symbol, "SOL");
        assert_eq!(signal.side, Side::Buy);
        assert_eq!(signal.entry_type, EntryType::Market);
        assert_eq!(signal.quantity, dec!(12));
        assert_eq!(signal.strategy_id, "OTHERS");
        assert!(signal.stop_price.is_none());
        assert!(signal.take_profits.is_empty());
    }

    #[tokio::test]
    async fn test_entry_defaults_to_market() {
        let signal = parse_ok(json!({"symbol": "sol", "side": "SELL", "quantity": "2.5"})).await;
        assert_eq!(signal.entry_type, EntryType::Market);
        assert_eq!(signal.symbol, "SOL");
        assert_eq!(signal.side, Side::Sell);
        assert_eq!(signal.quantity, dec!(2.5));
    }

    #[tokio::test]
    async fn test_limit_without_price_is_rejected() {
        let registry = StrategyRegistry::new();
        let err = parse(
            &json!({"symbol": "SOL", "side": "buy", "entry": "limit", "quantity": 1}),
            &registry,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ParseError::MissingLimitPrice));
    }

    #[tokio::test]
    async fn test_zero_quantity_is_rejected() {
        let registry = StrategyRegistry::new();
        let err = parse(
            &json!({"symbol": "SOL", "side": "buy", "quantity": 0}),
            &registry,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ParseError::NonPositiveQuantity));
    }

    #[tokio::test]
    async fn test_quantity_clamped_to_strategy_max() {
        let signal = parse_ok(json!({
            "strategy_id": "IMBA_TREND",
            "symbol": "ETH", "side": "buy", "quantity": 500
        }))
        .await;
        assert_eq!(signal.quantity, dec!(75));
    }

    #[tokio::test]
    async fn test_trend_dialect_field_mapping() {
        let signal = parse_ok(json!({
            "strategy_id": "IMBA_TREND",
            "symbol": "ETH", "side": "buy", "quantity": 1,
            "sl_price": 3400.5, "tp_price": 3600,
            // TP2-4 fields must be ignored for trend strategies.
            "tp2_price": 3700
        }))
        .await;
        assert_eq!(signal.stop_price, Some(dec!(3400.5)));
        assert_eq!(signal.take_profits.len(), 1);
        assert_eq!(
            signal.take_profits[0].target,
            Some(TargetPrice::Absolute(dec!(3600)))
        );
    }

    #[tokio::test]
    async fn test_trend_dialect_falls_back_to_stop_field() {
        let signal = parse_ok(json!({
            "strategy_id": "IMBA_TREND",
            "symbol": "ETH", "side": "sell", "quantity": 1, "stop": 3500
        }))
        .await;
        assert_eq!(signal.stop_price, Some(dec!(3500)));
    }

    #[tokio::test]
    async fn test_multi_target_dialect_collects_legs() {
        let signal = parse_ok(json!({
            "strategy_id": "IMBA_HYPER",
            "symbol": "SOL", "side": "buy", "quantity": 0.2,
            "stop": 170,
            "tp1_price": 190, "tp1_perc": 0.05,
            "tp3_perc": 0.1
        }))
        .await;
        assert_eq!(signal.stop_price, Some(dec!(170)));
        assert_eq!(signal.take_profits.len(), 2);

        let tp1 = &signal.take_profits[0];
        assert_eq!(tp1.index, 1);
        assert_eq!(tp1.target, Some(TargetPrice::Absolute(dec!(190))));
        assert_eq!(tp1.size, Some(dec!(0.05)));

        // No absolute price: perc becomes a percent-from-entry target and
        // still supplies the size.
        let tp3 = &signal.take_profits[1];
        assert_eq!(tp3.index, 3);
        assert_eq!(tp3.target, Some(TargetPrice::PercentFromEntry(dec!(0.1))));
        assert_eq!(tp3.size, Some(dec!(0.1)));
    }

    #[tokio::test]
    async fn test_auto_registration_is_idempotent() {
        let registry = StrategyRegistry::new();
        let payload = json!({
            "strategy_id": "NEWSTRAT", "symbol": "SOL", "side": "buy", "quantity": 1
        });
        parse(&payload, &registry).await.unwrap();
        parse(&payload, &registry).await.unwrap();
        assert_eq!(registry.ids().await, vec!["NEWSTRAT".to_string()]);
        // Unseen ids get the generic cap.
        let rule = registry.get("NEWSTRAT").await.unwrap();
        assert_eq!(rule.max_position_size, dec!(50));
    }

    #[test]
    fn test_percent_target_resolution() {
        let target = TargetPrice::PercentFromEntry(dec!(5));
        assert_eq!(target.resolve(Side::Buy, dec!(200)), dec!(210));
        assert_eq!(target.resolve(Side::Sell, dec!(200)), dec!(190));
    }
}
