pub mod registry;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub use registry::StrategyRegistry;

/// Which payload dialect a strategy's alerts speak.
///
/// Trend strategies send `sl_price`/`tp_price`; multi-target strategies send
/// `stop` plus up to four `tp{n}_price`/`tp{n}_perc` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDialect {
    Trend,
    MultiTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_daily_trades: u32,
    pub max_drawdown_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRule {
    pub strategy_id: String,
    pub name: String,
    pub enabled: bool,
    pub dialect: SignalDialect,
    /// Upper bound on per-order quantity; larger requests are clamped.
    pub max_position_size: Decimal,
    pub risk: RiskLimits,
}

impl StrategyRule {
    /// Built-in defaults for a strategy id seen for the first time.
    pub fn defaults_for(strategy_id: &str) -> Self {
        let (dialect, max_position_size) = match strategy_id {
            "IMBA_HYPER" => (SignalDialect::MultiTarget, dec!(100)),
            "IMBA_TREND" => (SignalDialect::Trend, dec!(75)),
            _ => (SignalDialect::MultiTarget, dec!(50)),
        };
        Self {
            strategy_id: strategy_id.to_string(),
            name: strategy_id.to_string(),
            enabled: true,
            dialect,
            max_position_size,
            risk: RiskLimits {
                max_daily_trades: 50,
                max_drawdown_pct: dec!(20),
            },
        }
    }
}
