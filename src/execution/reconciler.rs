use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::exchange::{ack_outcome, CloseOptions, ExchangeClient, ExchangeError, Tif};
use crate::metrics::RECONCILE_FALLBACKS_TOTAL;

const CLOSE_SLIPPAGE: Decimal = dec!(0.05);
/// Price offset for the last-resort reduce-only close: cross the book by 10%.
const FALLBACK_PRICE_OFFSET: Decimal = dec!(0.10);

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconcileAction {
    ClosedPosition { size: Decimal, fallback: bool },
    CloseFailed { message: String },
    CancelledOrder { order_id: u64 },
    CancelFailed { order_id: u64, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// True when the symbol holds no position after reconciliation. Cancel
    /// failures are diagnostics and never flip this.
    pub cleared: bool,
    pub actions: Vec<ReconcileAction>,
}

// ---------------------------------------------------------------------------
// PositionReconciler
// ---------------------------------------------------------------------------

pub struct PositionReconciler {
    exchange: Arc<dyn ExchangeClient>,
    settle_close_to_cancel: Duration,
}

impl PositionReconciler {
    pub fn new(exchange: Arc<dyn ExchangeClient>, settle_close_to_cancel: Duration) -> Self {
        Self {
            exchange,
            settle_close_to_cancel,
        }
    }

    /// Leave the symbol with no position and no resting orders.
    ///
    /// Position closes escalate through three attempts: a sized close with
    /// explicit slippage, a bare close, then a reduce-only IOC limit crossed
    /// through the entry price. A null ack counts as failure at every step.
    /// The cancel sweep afterwards is best-effort.
    ///
    /// State queries propagate their errors: without a trustworthy view of
    /// the account there is nothing safe to do downstream.
    pub async fn clear_symbol(&self, symbol: &str) -> Result<ReconcileReport, ExchangeError> {
        let mut actions = Vec::new();
        let mut cleared = true;

        if let Some(position) = self.exchange.get_position(symbol).await? {
            info!(symbol, size = %position.size, "clearing_existing_position");
            match self.close_with_fallbacks(symbol, &position).await {
                Ok(fallback) => {
                    if fallback {
                        metrics::counter!(RECONCILE_FALLBACKS_TOTAL).increment(1);
                    }
                    actions.push(ReconcileAction::ClosedPosition {
                        size: position.size,
                        fallback,
                    });
                }
                Err(message) => {
                    warn!(symbol, %message, "position_close_exhausted");
                    cleared = false;
                    actions.push(ReconcileAction::CloseFailed { message });
                }
            }

            // Closes apply asynchronously on the venue side.
            tokio::time::sleep(self.settle_close_to_cancel).await;
        }

        for order in self.exchange.get_open_orders(symbol).await? {
            match self.exchange.cancel_order(symbol, order.id).await {
                Ok(ack) if ack_outcome(&ack).is_success() => {
                    actions.push(ReconcileAction::CancelledOrder { order_id: order.id });
                }
                Ok(ack) => {
                    let message = ack_outcome(&ack)
                        .error()
                        .unwrap_or("unknown error")
                        .to_string();
                    warn!(symbol, order_id = order.id, %message, "cancel_rejected");
                    actions.push(ReconcileAction::CancelFailed {
                        order_id: order.id,
                        message,
                    });
                }
                Err(e) => {
                    warn!(symbol, order_id = order.id, error = %e, "cancel_failed");
                    actions.push(ReconcileAction::CancelFailed {
                        order_id: order.id,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(ReconcileReport { cleared, actions })
    }

    /// Returns Ok(fallback_used) once an attempt sticks, Err(last message)
    /// when the whole ladder is exhausted.
    async fn close_with_fallbacks(
        &self,
        symbol: &str,
        position: &crate::exchange::PositionInfo,
    ) -> Result<bool, String> {
        let size = position.size.abs();
        let mut last_error = String::from("no close attempt succeeded");

        // Attempt 1: sized close with explicit slippage.
        let opts = CloseOptions {
            size: Some(size),
            slippage: Some(CLOSE_SLIPPAGE),
        };
        match self.close_attempt(symbol, opts).await {
            Ok(()) => return Ok(false),
            Err(message) => {
                warn!(symbol, %message, "close_attempt_failed_retrying_minimal");
                last_error = message;
            }
        }

        // Attempt 2: minimal parameters, let the client fill in defaults.
        match self.close_attempt(symbol, CloseOptions::default()).await {
            Ok(()) => return Ok(false),
            Err(message) => {
                warn!(symbol, %message, "minimal_close_failed_trying_reduce_only");
                last_error = message;
            }
        }

        // Attempt 3: reduce-only IOC limit crossed well through the book.
        let Some(entry_price) = position.entry_price else {
            return Err(format!("{last_error}; no entry price for reduce-only fallback"));
        };
        let is_buy = position.size < Decimal::ZERO;
        let price = if is_buy {
            entry_price * (Decimal::ONE + FALLBACK_PRICE_OFFSET)
        } else {
            entry_price * (Decimal::ONE - FALLBACK_PRICE_OFFSET)
        };
        match self
            .exchange
            .place_limit_order(symbol, is_buy, size, price, Tif::Ioc, true)
            .await
        {
            Ok(ack) => match ack_outcome(&ack) {
                outcome if outcome.is_success() => {
                    info!(symbol, %size, "position_closed_via_reduce_only_fallback");
                    Ok(true)
                }
                outcome => Err(outcome.error().unwrap_or("unknown error").to_string()),
            },
            Err(e) => Err(e.to_string()),
        }
    }

    async fn close_attempt(&self, symbol: &str, opts: CloseOptions) -> Result<(), String> {
        match self.exchange.close_position(symbol, opts).await {
            Ok(Some(ack)) => match ack_outcome(&ack) {
                outcome if outcome.is_success() => Ok(()),
                outcome => Err(outcome.error().unwrap_or("unknown error").to_string()),
            },
            // Null ack means the close never reached the book.
            Ok(None) => Err("close returned no response".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::mock::{ack_error, ack_filled, MockExchange};
    use crate::exchange::{OpenOrder, PositionInfo};

    fn reconciler(mock: Arc<MockExchange>) -> PositionReconciler {
        PositionReconciler::new(mock, Duration::ZERO)
    }

    fn short_position(size: Decimal) -> PositionInfo {
        PositionInfo {
            symbol: "SOL".into(),
            size,
            entry_price: Some(dec!(160)),
        }
    }

    #[tokio::test]
    async fn test_clean_account_is_noop() {
        let mock = Arc::new(MockExchange::new());
        let report = reconciler(mock.clone()).clear_symbol("SOL").await.unwrap();

        assert!(report.cleared);
        assert!(report.actions.is_empty());
        assert_eq!(
            mock.call_log(),
            vec!["get_position:SOL", "get_open_orders:SOL"]
        );
    }

    #[tokio::test]
    async fn test_first_close_attempt_succeeds() {
        let mock = Arc::new(MockExchange::new());
        mock.script_position(Some(short_position(dec!(5))));
        mock.script_close_ack(Some(ack_filled("161")));

        let report = reconciler(mock.clone()).clear_symbol("SOL").await.unwrap();
        assert!(report.cleared);
        assert!(matches!(
            report.actions[0],
            ReconcileAction::ClosedPosition { fallback: false, .. }
        ));
        // Sized close first, never the fallback order.
        assert!(mock.call_log().contains(&"close_position:SOL:sized".to_string()));
        assert!(!mock.call_log().iter().any(|c| c.starts_with("limit:")));
    }

    #[tokio::test]
    async fn test_null_acks_escalate_to_reduce_only_fallback() {
        let mock = Arc::new(MockExchange::new());
        mock.script_position(Some(short_position(dec!(-10.73))));
        mock.script_close_ack(None);
        mock.script_close_ack(None);
        mock.script_order_ack(ack_filled("176"));

        let report = reconciler(mock.clone()).clear_symbol("SOL").await.unwrap();
        assert!(report.cleared);
        assert!(matches!(
            report.actions[0],
            ReconcileAction::ClosedPosition { fallback: true, .. }
        ));

        // Short position buys back 10% above entry: 160 * 1.10 = 176.00.
        let log = mock.call_log();
        assert!(log.contains(&"limit:SOL:buy:10.73:176.00:reduce".to_string()), "{log:?}");
    }

    #[tokio::test]
    async fn test_exhausted_ladder_reports_not_cleared() {
        let mock = Arc::new(MockExchange::new());
        mock.script_position(Some(short_position(dec!(3))));
        mock.script_close_ack(None);
        mock.script_close_ack(None);
        mock.script_order_ack(ack_error("insufficient margin"));

        let report = reconciler(mock.clone()).clear_symbol("SOL").await.unwrap();
        assert!(!report.cleared);
        assert!(matches!(report.actions[0], ReconcileAction::CloseFailed { .. }));
    }

    #[tokio::test]
    async fn test_cancel_failure_does_not_flip_cleared() {
        let mock = Arc::new(MockExchange::new());
        mock.script_open_orders(vec![OpenOrder {
            id: 42,
            symbol: "SOL".into(),
            side: "B".into(),
            size: dec!(1),
            price: Some(dec!(150)),
            trigger_price: None,
        }]);
        mock.script_cancel_ack(serde_json::json!({
            "status": "ok",
            "response": {"type": "cancel", "data": {"statuses": ["Order already canceled"]}}
        }));

        let report = reconciler(mock.clone()).clear_symbol("SOL").await.unwrap();
        assert!(report.cleared);
        assert!(matches!(
            report.actions[0],
            ReconcileAction::CancelFailed { order_id: 42, .. }
        ));
    }
}
