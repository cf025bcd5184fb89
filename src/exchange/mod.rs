pub mod hyperliquid;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("http error: {0}")]
    Http(String),
    #[error("exchange rejected request: {0}")]
    Api(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("unexpected response shape: {0}")]
    Parse(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("unknown asset: {0}")]
    UnknownAsset(String),
}

impl ExchangeError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

// ---------------------------------------------------------------------------
// Boundary types
// ---------------------------------------------------------------------------

/// Open position for one symbol. `size` is signed: positive long, negative short.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub symbol: String,
    pub size: Decimal,
    pub entry_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: u64,
    pub symbol: String,
    pub side: String,
    pub size: Decimal,
    pub price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy)]
pub struct AssetMetadata {
    pub size_decimals: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tif {
    Gtc,
    Ioc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpSl {
    Tp,
    Sl,
}

/// Options for the dedicated close-position primitive.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloseOptions {
    /// Portion of the position to close. None closes the full position.
    pub size: Option<Decimal>,
    /// Slippage tolerance for the market close. None lets the client default.
    pub slippage: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// ExchangeClient trait
// ---------------------------------------------------------------------------

/// The exchange boundary. Every call returns `Result<_, ExchangeError>`;
/// callers decide retry/fallback from the error variant.
///
/// Acks are the exchange's raw JSON response. The exchange acknowledges at
/// the transport level even when the order is logically rejected, so callers
/// must run acks through [`ack_outcome`] rather than trusting a top-level "ok".
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_position(&self, symbol: &str) -> Result<Option<PositionInfo>, ExchangeError>;

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, ExchangeError>;

    /// Close the position at market. Returns `None` when the exchange answers
    /// with an empty/null body — callers treat that as failure, not success.
    async fn close_position(
        &self,
        symbol: &str,
        opts: CloseOptions,
    ) -> Result<Option<Value>, ExchangeError>;

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<Value, ExchangeError>;

    async fn place_market_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        slippage: Decimal,
    ) -> Result<Value, ExchangeError>;

    async fn place_limit_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        price: Decimal,
        tif: Tif,
        reduce_only: bool,
    ) -> Result<Value, ExchangeError>;

    #[allow(clippy::too_many_arguments)]
    async fn place_trigger_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        trigger_price: Decimal,
        is_market_on_trigger: bool,
        tpsl: TpSl,
        reduce_only: bool,
    ) -> Result<Value, ExchangeError>;

    async fn get_asset_metadata(&self, symbol: &str) -> Result<AssetMetadata, ExchangeError>;

    async fn get_balance(&self) -> Result<Decimal, ExchangeError>;

    /// Exchange name, for logging.
    fn exchange_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Tolerant ack inspection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Success,
    Error(String),
}

impl AckOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Error(msg) => Some(msg),
        }
    }
}

/// Classify an exchange ack.
///
/// The exchange returns `status: "ok"` even when the order inside failed; the
/// real verdict sits in `response.data.statuses[]`. A status entry that is an
/// object with an `error` field is a failure. `filled`/`resting` markers (or
/// the literal string "success" for cancels) are success. Statuses present
/// with no explicit error are treated as success.
pub fn ack_outcome(ack: &Value) -> AckOutcome {
    if ack.is_null() {
        return AckOutcome::Error("no response received".into());
    }

    match ack.get("status").and_then(Value::as_str) {
        Some("ok") => {}
        _ => {
            let msg = ack
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return AckOutcome::Error(msg);
        }
    }

    let statuses = ack
        .get("response")
        .and_then(|r| r.get("data"))
        .and_then(|d| d.get("statuses"))
        .and_then(Value::as_array);

    let Some(statuses) = statuses else {
        // Top-level ok with no per-order detail: nothing contradicts success.
        return AckOutcome::Success;
    };

    for status in statuses {
        match status {
            Value::Object(map) => {
                if let Some(err) = map.get("error") {
                    let msg = err.as_str().unwrap_or("unknown error").to_string();
                    return AckOutcome::Error(msg);
                }
                if map.contains_key("filled") || map.contains_key("resting") {
                    return AckOutcome::Success;
                }
            }
            Value::String(s) if s == "success" => return AckOutcome::Success,
            Value::String(s) => return AckOutcome::Error(s.clone()),
            _ => {}
        }
    }

    AckOutcome::Success
}

/// Extract the average fill price from an order ack, if the entry filled.
pub fn fill_price(ack: &Value) -> Option<Decimal> {
    let statuses = ack
        .get("response")?
        .get("data")?
        .get("statuses")?
        .as_array()?;

    for status in statuses {
        if let Some(filled) = status.get("filled") {
            if let Some(px) = filled.get("avgPx") {
                if let Some(s) = px.as_str() {
                    if let Ok(d) = s.parse() {
                        return Some(d);
                    }
                }
                if let Some(f) = px.as_f64() {
                    return rust_decimal::prelude::FromPrimitive::from_f64(f);
                }
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
