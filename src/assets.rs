use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::exchange::{ExchangeClient, ExchangeError};

/// Exchange-wide hard cap on a single order's quantity.
pub const MAX_QUANTITY: Decimal = dec!(1000);

/// Orders below this notional value are rejected by the venue.
pub const MIN_NOTIONAL_USD: Decimal = dec!(10);

// ---------------------------------------------------------------------------
// TickRounding
// ---------------------------------------------------------------------------

/// How entry prices snap to the venue's grid for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickRounding {
    /// Round to the nearest multiple of the step.
    FixedStep(Decimal),
    /// Truncate to a fixed number of decimals, never rounding up.
    TruncateDecimals(u32),
}

// ---------------------------------------------------------------------------
// AssetFormatRules
// ---------------------------------------------------------------------------

/// Per-asset formatting rules: size precision from exchange metadata, price
/// conventions from the hand-maintained tables below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFormatRules {
    pub symbol: String,
    pub size_decimals: u32,
    pub price_decimals: u32,
    pub requires_integer_price: bool,
    pub tick: TickRounding,
}

impl AssetFormatRules {
    pub fn from_metadata(symbol: &str, size_decimals: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            size_decimals,
            price_decimals: price_decimals_for(symbol),
            requires_integer_price: matches!(symbol, "ETH" | "BTC"),
            tick: tick_rounding_for(symbol),
        }
    }

    /// Truncate a quantity to the asset's size precision. Truncation only:
    /// rounding up could exceed the caller's intended exposure.
    pub fn truncate_size(&self, size: Decimal) -> Decimal {
        size.trunc_with_scale(self.size_decimals)
    }

    /// Snap an entry price onto the asset's grid.
    pub fn round_to_tick(&self, price: Decimal) -> Decimal {
        match self.tick {
            TickRounding::FixedStep(step) => (price / step).round() * step,
            TickRounding::TruncateDecimals(decimals) => price.trunc_with_scale(decimals),
        }
    }

    /// Format a stop/take-profit trigger price. ETH and BTC triggers must be
    /// whole numbers; everything else keeps two decimals.
    pub fn format_trigger_price(&self, price: Decimal) -> Decimal {
        if self.requires_integer_price {
            price.round_dp(0)
        } else {
            price.round_dp(self.price_decimals)
        }
    }

    /// Smallest acceptable entry quantity: one order of magnitude above the
    /// size precision, with 0.1 as the coarse-asset floor.
    pub fn min_size(&self) -> Decimal {
        if self.size_decimals > 1 {
            // 10^(1 - sz_decimals): 0.1 at 2 decimals, 0.01 at 3, ...
            Decimal::new(1, self.size_decimals - 1)
        } else {
            dec!(0.1)
        }
    }

    pub fn meets_notional_floor(&self, size: Decimal, price: Decimal) -> bool {
        size * price >= MIN_NOTIONAL_USD
    }
}

fn price_decimals_for(symbol: &str) -> u32 {
    match symbol {
        "BTC" => 1,
        "ETH" | "SOL" | "AVAX" | "ATOM" | "BNB" => 2,
        _ => 2,
    }
}

fn tick_rounding_for(symbol: &str) -> TickRounding {
    match symbol {
        "SOL" | "ETH" | "AVAX" => TickRounding::FixedStep(dec!(0.50)),
        "BTC" => TickRounding::FixedStep(dec!(10)),
        _ => TickRounding::TruncateDecimals(4),
    }
}

// ---------------------------------------------------------------------------
// AssetRulesCache
// ---------------------------------------------------------------------------

/// Read-through cache keyed by symbol. Size decimals come from the exchange's
/// asset metadata and never change, so entries have no TTL.
pub struct AssetRulesCache {
    cache: RwLock<HashMap<String, AssetFormatRules>>,
    exchange: Arc<dyn ExchangeClient>,
}

impl AssetRulesCache {
    pub fn new(exchange: Arc<dyn ExchangeClient>) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            exchange,
        }
    }

    pub async fn rules_for(&self, symbol: &str) -> Result<AssetFormatRules, ExchangeError> {
        // Check cache first (read lock).
        {
            let cache = self.cache.read().unwrap();
            if let Some(rules) = cache.get(symbol) {
                return Ok(rules.clone());
            }
        }

        let metadata = self.exchange.get_asset_metadata(symbol).await?;
        let rules = AssetFormatRules::from_metadata(symbol, metadata.size_decimals);

        {
            let mut cache = self.cache.write().unwrap();
            cache.insert(symbol.to_string(), rules.clone());
        }

        Ok(rules)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
