use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tracing::{info, warn};

use super::{ExecutionReport, LegKind, LegRecord, LegStatus, OrderLeg};
use crate::assets::{AssetFormatRules, MIN_NOTIONAL_USD};
use crate::exchange::{ack_outcome, fill_price, ExchangeClient, Tif, TpSl};
use crate::metrics::LEGS_TOTAL;
use crate::signal::{EntryType, TargetPrice, TradeSignal};

const ENTRY_SLIPPAGE: Decimal = dec!(0.05);

/// Price grids tried for a LIMIT entry, coarsest first. The venue rejects
/// prices off its tick grid and the grid is not discoverable upfront, so the
/// executor walks the ladder until one sticks.
const LIMIT_PRICE_STEPS: [Decimal; 5] = [
    dec!(0.50),
    dec!(1.00),
    dec!(0.25),
    dec!(0.10),
    dec!(0.05),
];

// ---------------------------------------------------------------------------
// OrderExecutor
// ---------------------------------------------------------------------------

pub struct OrderExecutor {
    exchange: Arc<dyn ExchangeClient>,
    limit_retry_delay: Duration,
}

impl OrderExecutor {
    pub fn new(exchange: Arc<dyn ExchangeClient>, limit_retry_delay: Duration) -> Self {
        Self {
            exchange,
            limit_retry_delay,
        }
    }

    /// Place the planned legs in order. The entry goes first; if it fails,
    /// every protective leg is skipped rather than placed against a position
    /// that does not exist. Stop/TP legs after a good entry are independent:
    /// one failing does not stop the others.
    pub async fn execute(
        &self,
        signal: &TradeSignal,
        rules: &AssetFormatRules,
        legs: &[OrderLeg],
    ) -> ExecutionReport {
        let Some((entry, protective)) = legs.split_first() else {
            return ExecutionReport {
                entry_filled: false,
                fill_price: None,
                legs: Vec::new(),
            };
        };

        let mut records = Vec::with_capacity(legs.len());

        let entry_ack = match signal.entry_type {
            EntryType::Market => self.place_market_entry(signal, entry).await,
            EntryType::Limit => self.place_limit_entry(signal, entry).await,
        };

        let entry_ack = match entry_ack {
            Ok(ack) => {
                records.push(LegRecord::success(&entry.kind, ack.clone()));
                record_leg_metric(&entry.kind, LegStatus::Success);
                ack
            }
            Err(message) => {
                warn!(symbol = %signal.symbol, %message, "entry_failed_skipping_protective_legs");
                records.push(LegRecord::error(&entry.kind, message, None));
                record_leg_metric(&entry.kind, LegStatus::Error);
                for leg in protective {
                    records.push(LegRecord::skipped(&leg.kind, "entry order failed"));
                    record_leg_metric(&leg.kind, LegStatus::Skipped);
                }
                return ExecutionReport {
                    entry_filled: false,
                    fill_price: None,
                    legs: records,
                };
            }
        };

        // Fill price feeds percent-target resolution; a resting limit entry
        // falls back to its own limit price.
        let entry_price = fill_price(&entry_ack).or(signal.limit_price);

        for leg in protective {
            let record = self.place_protective_leg(signal, rules, leg, entry_price).await;
            record_leg_metric(&leg.kind, record.status);
            records.push(record);
        }

        ExecutionReport {
            entry_filled: true,
            fill_price: entry_price,
            legs: records,
        }
    }

    async fn place_market_entry(
        &self,
        signal: &TradeSignal,
        entry: &OrderLeg,
    ) -> Result<Value, String> {
        info!(symbol = %signal.symbol, size = %entry.size, "placing_market_entry");
        let ack = self
            .exchange
            .place_market_order(&signal.symbol, entry.side.is_buy(), entry.size, ENTRY_SLIPPAGE)
            .await
            .map_err(|e| e.to_string())?;
        match ack_outcome(&ack) {
            outcome if outcome.is_success() => Ok(ack),
            outcome => Err(outcome.error().unwrap_or("unknown error").to_string()),
        }
    }

    /// Single market attempt would be ambiguous for limits: a rejection here
    /// usually means the price missed the tick grid, so retry across grids.
    async fn place_limit_entry(
        &self,
        signal: &TradeSignal,
        entry: &OrderLeg,
    ) -> Result<Value, String> {
        let base = entry
            .price
            .ok_or_else(|| "limit entry without a price".to_string())?;
        let mut last_error = String::from("no attempt made");

        for (attempt, step) in LIMIT_PRICE_STEPS.iter().enumerate() {
            let price = (base / step).round() * step;
            info!(
                symbol = %signal.symbol,
                attempt = attempt + 1,
                %price,
                "placing_limit_entry"
            );

            match self
                .exchange
                .place_limit_order(
                    &signal.symbol,
                    entry.side.is_buy(),
                    entry.size,
                    price,
                    Tif::Gtc,
                    false,
                )
                .await
            {
                Ok(ack) => match ack_outcome(&ack) {
                    outcome if outcome.is_success() => return Ok(ack),
                    outcome => {
                        last_error = outcome.error().unwrap_or("unknown error").to_string();
                        warn!(
                            symbol = %signal.symbol,
                            attempt = attempt + 1,
                            error = %last_error,
                            "limit_entry_attempt_rejected"
                        );
                    }
                },
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        symbol = %signal.symbol,
                        attempt = attempt + 1,
                        error = %last_error,
                        "limit_entry_attempt_failed"
                    );
                }
            }

            if attempt + 1 < LIMIT_PRICE_STEPS.len() {
                tokio::time::sleep(self.limit_retry_delay).await;
            }
        }

        Err(format!(
            "limit entry failed after {} attempts: {last_error}",
            LIMIT_PRICE_STEPS.len()
        ))
    }

    async fn place_protective_leg(
        &self,
        signal: &TradeSignal,
        rules: &AssetFormatRules,
        leg: &OrderLeg,
        entry_price: Option<Decimal>,
    ) -> LegRecord {
        let Some(target) = leg.trigger else {
            return LegRecord::skipped(&leg.kind, "no trigger price");
        };

        let trigger_price = match target {
            TargetPrice::Absolute(price) => price,
            TargetPrice::PercentFromEntry(_) => {
                let Some(entry_price) = entry_price else {
                    return LegRecord::skipped(
                        &leg.kind,
                        "percent target unresolvable without an entry price",
                    );
                };
                let resolved = rules.format_trigger_price(target.resolve(signal.side, entry_price));
                // Absolute targets were dust-checked at planning; percent
                // targets only become checkable here.
                if !rules.meets_notional_floor(leg.size, resolved) {
                    return LegRecord::skipped(
                        &leg.kind,
                        format!(
                            "notional {} below the {MIN_NOTIONAL_USD} minimum",
                            leg.size * resolved
                        ),
                    );
                }
                resolved
            }
        };

        let tpsl = match leg.kind {
            LegKind::Stop => TpSl::Sl,
            LegKind::Tp(_) => TpSl::Tp,
            LegKind::Entry => return LegRecord::skipped(&leg.kind, "entry is not a trigger leg"),
        };

        match self
            .exchange
            .place_trigger_order(
                &signal.symbol,
                leg.side.is_buy(),
                leg.size,
                trigger_price,
                true,
                tpsl,
                leg.reduce_only,
            )
            .await
        {
            Ok(ack) => match ack_outcome(&ack) {
                outcome if outcome.is_success() => LegRecord::success(&leg.kind, ack),
                outcome => {
                    let message = outcome.error().unwrap_or("unknown error").to_string();
                    warn!(symbol = %signal.symbol, leg = %leg.client_tag, %message, "trigger_leg_rejected");
                    LegRecord::error(&leg.kind, message, Some(ack))
                }
            },
            Err(e) => {
                warn!(symbol = %signal.symbol, leg = %leg.client_tag, error = %e, "trigger_leg_failed");
                LegRecord::error(&leg.kind, e.to_string(), None)
            }
        }
    }
}

fn record_leg_metric(kind: &LegKind, status: LegStatus) {
    metrics::counter!(
        LEGS_TOTAL,
        "kind" => kind.tag(),
        "status" => status.as_str()
    )
    .increment(1);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
