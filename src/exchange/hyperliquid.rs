use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use alloy::primitives::{keccak256, Address};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol;
use alloy::sol_types::{eip712_domain, SolStruct};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{
    AssetMetadata, CloseOptions, ExchangeClient, ExchangeError, OpenOrder, PositionInfo, TpSl,
    Tif,
};
use crate::metrics::EXCHANGE_CALL_DURATION;

const DEFAULT_CLOSE_SLIPPAGE: Decimal = dec!(0.05);

// ---------------------------------------------------------------------------
// EIP-712 agent struct (Hyperliquid L1 action signing)
// ---------------------------------------------------------------------------

sol! {
    #[derive(Debug)]
    struct Agent {
        string source;
        bytes32 connectionId;
    }
}

// ---------------------------------------------------------------------------
// Wire types (short keys are the exchange's action schema)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WireOrder {
    a: u32,
    b: bool,
    p: String,
    s: String,
    r: bool,
    t: WireOrderType,
}

#[derive(Debug, Serialize)]
enum WireOrderType {
    #[serde(rename = "limit")]
    Limit { tif: String },
    #[serde(rename = "trigger")]
    Trigger {
        #[serde(rename = "isMarket")]
        is_market: bool,
        #[serde(rename = "triggerPx")]
        trigger_px: String,
        tpsl: String,
    },
}

#[derive(Debug, Serialize)]
struct OrderAction {
    #[serde(rename = "type")]
    kind: &'static str,
    orders: Vec<WireOrder>,
    grouping: &'static str,
}

#[derive(Debug, Serialize)]
struct CancelAction {
    #[serde(rename = "type")]
    kind: &'static str,
    cancels: Vec<WireCancel>,
}

#[derive(Debug, Serialize)]
struct WireCancel {
    a: u32,
    o: u64,
}

// ---------------------------------------------------------------------------
// Asset metadata cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct AssetEntry {
    index: u32,
    size_decimals: u32,
}

// ---------------------------------------------------------------------------
// HyperliquidClient
// ---------------------------------------------------------------------------

pub struct HyperliquidClient {
    http: reqwest::Client,
    base_url: String,
    signer: PrivateKeySigner,
    is_mainnet: bool,
    meta: RwLock<HashMap<String, AssetEntry>>,
}

impl HyperliquidClient {
    pub fn new(base_url: &str, private_key: &str, is_mainnet: bool) -> anyhow::Result<Self> {
        let signer: PrivateKeySigner = private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid private key: {e}"))?;

        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
            is_mainnet,
            meta: RwLock::new(HashMap::new()),
        })
    }

    pub fn wallet_address(&self) -> Address {
        self.signer.address()
    }

    /// Unsigned POST /info query.
    async fn info(&self, body: Value) -> Result<Value, ExchangeError> {
        let url = format!("{}/info", self.base_url);
        let started = Instant::now();
        let result = self.http.post(&url).json(&body).send().await;
        metrics::histogram!(EXCHANGE_CALL_DURATION, "endpoint" => "info")
            .record(started.elapsed().as_secs_f64());
        let resp = result.map_err(|e| ExchangeError::Http(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(ExchangeError::RateLimited("info query throttled".into()));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ExchangeError::Api(format!("info {status}: {text}")));
        }

        resp.json().await.map_err(|e| ExchangeError::Parse(e.to_string()))
    }

    /// Sign and POST an action to /exchange.
    ///
    /// Flow: msgpack the action -> keccak(action ++ nonce ++ vault flag) ->
    /// EIP-712 sign the Agent struct -> POST {action, nonce, signature}.
    async fn post_action<A: Serialize>(&self, action: &A) -> Result<Value, ExchangeError> {
        // 1. Action hash: msgpack bytes, nonce (big-endian), 0x00 = no vault.
        let nonce = now_millis();
        let mut bytes = rmp_serde::to_vec_named(action)
            .map_err(|e| ExchangeError::Signing(e.to_string()))?;
        bytes.extend_from_slice(&nonce.to_be_bytes());
        bytes.push(0x00);
        let connection_id = keccak256(&bytes);

        // 2. Sign the phantom agent over the action hash.
        let agent = Agent {
            source: if self.is_mainnet { "a" } else { "b" }.to_string(),
            connectionId: connection_id,
        };
        let domain = eip712_domain! {
            name: "Exchange",
            version: "1",
            chain_id: 1337,
            verifying_contract: Address::ZERO,
        };
        let signing_hash = agent.eip712_signing_hash(&domain);
        let signature = self
            .signer
            .sign_hash_sync(&signing_hash)
            .map_err(|e| ExchangeError::Signing(e.to_string()))?;

        let payload = json!({
            "action": serde_json::to_value(action)
                .map_err(|e| ExchangeError::Signing(e.to_string()))?,
            "nonce": nonce,
            "signature": {
                "r": format!("0x{}", hex::encode(signature.r().to_be_bytes::<32>())),
                "s": format!("0x{}", hex::encode(signature.s().to_be_bytes::<32>())),
                "v": if signature.v() { 28u8 } else { 27u8 },
            },
        });

        // 3. POST /exchange.
        let url = format!("{}/exchange", self.base_url);
        let started = Instant::now();
        let result = self.http.post(&url).json(&payload).send().await;
        metrics::histogram!(EXCHANGE_CALL_DURATION, "endpoint" => "exchange")
            .record(started.elapsed().as_secs_f64());
        let resp = result.map_err(|e| ExchangeError::Http(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(ExchangeError::RateLimited("exchange action throttled".into()));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ExchangeError::Api(format!("exchange {status}: {text}")));
        }

        resp.json().await.map_err(|e| ExchangeError::Parse(e.to_string()))
    }

    /// Look up (and lazily load) the asset's index and size decimals.
    async fn asset_entry(&self, symbol: &str) -> Result<AssetEntry, ExchangeError> {
        {
            let meta = self.meta.read().unwrap();
            if let Some(entry) = meta.get(symbol) {
                return Ok(*entry);
            }
        }

        let resp = self.info(json!({"type": "meta"})).await?;
        let universe = resp
            .get("universe")
            .and_then(Value::as_array)
            .ok_or_else(|| ExchangeError::Parse("meta response missing universe".into()))?;

        let mut meta = self.meta.write().unwrap();
        for (index, asset) in universe.iter().enumerate() {
            let Some(name) = asset.get("name").and_then(Value::as_str) else {
                continue;
            };
            let size_decimals = asset
                .get("szDecimals")
                .and_then(Value::as_u64)
                .unwrap_or(3) as u32;
            meta.insert(
                name.to_string(),
                AssetEntry {
                    index: index as u32,
                    size_decimals,
                },
            );
        }

        meta.get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::UnknownAsset(symbol.to_string()))
    }

    /// Current mid price, used to price aggressive IOC closes.
    async fn mid_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let mids = self.info(json!({"type": "allMids"})).await?;
        mids.get(symbol)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ExchangeError::Parse(format!("no mid price for {symbol}")))
    }

    async fn send_single_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        price: Decimal,
        reduce_only: bool,
        order_type: WireOrderType,
    ) -> Result<Value, ExchangeError> {
        let entry = self.asset_entry(symbol).await?;
        let order = WireOrder {
            a: entry.index,
            b: is_buy,
            p: wire_decimal(round_px(price, entry.size_decimals)),
            s: wire_decimal(size),
            r: reduce_only,
            t: order_type,
        };
        debug!(symbol, is_buy, %size, %price, reduce_only, "order_submitting");
        self.post_action(&OrderAction {
            kind: "order",
            orders: vec![order],
            grouping: "na",
        })
        .await
    }
}

#[async_trait]
impl ExchangeClient for HyperliquidClient {
    async fn get_position(&self, symbol: &str) -> Result<Option<PositionInfo>, ExchangeError> {
        let user = format!("{:?}", self.wallet_address());
        let state = self
            .info(json!({"type": "clearinghouseState", "user": user}))
            .await?;

        let positions = state
            .get("assetPositions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for entry in positions {
            let Some(pos) = entry.get("position") else { continue };
            if pos.get("coin").and_then(Value::as_str) != Some(symbol) {
                continue;
            }
            let size: Decimal = pos
                .get("szi")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(Decimal::ZERO);
            if size.is_zero() {
                continue;
            }
            let entry_price = pos
                .get("entryPx")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok());
            return Ok(Some(PositionInfo {
                symbol: symbol.to_string(),
                size,
                entry_price,
            }));
        }
        Ok(None)
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, ExchangeError> {
        let user = format!("{:?}", self.wallet_address());
        let orders = self
            .info(json!({"type": "openOrders", "user": user}))
            .await?;

        let orders = orders.as_array().cloned().unwrap_or_default();
        let mut result = Vec::new();
        for order in orders {
            if order.get("coin").and_then(Value::as_str) != Some(symbol) {
                continue;
            }
            let Some(id) = order.get("oid").and_then(Value::as_u64) else {
                warn!(symbol, "open_order_missing_oid");
                continue;
            };
            result.push(OpenOrder {
                id,
                symbol: symbol.to_string(),
                side: order
                    .get("side")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                size: order
                    .get("sz")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(Decimal::ZERO),
                price: order
                    .get("limitPx")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok()),
                trigger_price: order
                    .get("triggerPx")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok()),
            });
        }
        Ok(result)
    }

    async fn close_position(
        &self,
        symbol: &str,
        opts: CloseOptions,
    ) -> Result<Option<Value>, ExchangeError> {
        let Some(position) = self.get_position(symbol).await? else {
            return Ok(None);
        };

        let size = opts.size.unwrap_or_else(|| position.size.abs());
        let is_buy = position.size < Decimal::ZERO;
        let slippage = opts.slippage.unwrap_or(DEFAULT_CLOSE_SLIPPAGE);

        let mid = self.mid_price(symbol).await?;
        let price = if is_buy {
            mid * (Decimal::ONE + slippage)
        } else {
            mid * (Decimal::ONE - slippage)
        };

        let ack = self
            .send_single_order(
                symbol,
                is_buy,
                size,
                price,
                true,
                WireOrderType::Limit { tif: "Ioc".into() },
            )
            .await?;
        Ok(Some(ack))
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<Value, ExchangeError> {
        let entry = self.asset_entry(symbol).await?;
        self.post_action(&CancelAction {
            kind: "cancel",
            cancels: vec![WireCancel {
                a: entry.index,
                o: order_id,
            }],
        })
        .await
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        slippage: Decimal,
    ) -> Result<Value, ExchangeError> {
        // Market orders are aggressive IOC limits priced through the book.
        let mid = self.mid_price(symbol).await?;
        let price = if is_buy {
            mid * (Decimal::ONE + slippage)
        } else {
            mid * (Decimal::ONE - slippage)
        };
        self.send_single_order(
            symbol,
            is_buy,
            size,
            price,
            false,
            WireOrderType::Limit { tif: "Ioc".into() },
        )
        .await
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        price: Decimal,
        tif: Tif,
        reduce_only: bool,
    ) -> Result<Value, ExchangeError> {
        let tif = match tif {
            Tif::Gtc => "Gtc",
            Tif::Ioc => "Ioc",
        };
        self.send_single_order(
            symbol,
            is_buy,
            size,
            price,
            reduce_only,
            WireOrderType::Limit { tif: tif.into() },
        )
        .await
    }

    async fn place_trigger_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        trigger_price: Decimal,
        is_market_on_trigger: bool,
        tpsl: TpSl,
        reduce_only: bool,
    ) -> Result<Value, ExchangeError> {
        let entry = self.asset_entry(symbol).await?;
        let px = wire_decimal(round_px(trigger_price, entry.size_decimals));
        self.send_single_order(
            symbol,
            is_buy,
            size,
            trigger_price,
            reduce_only,
            WireOrderType::Trigger {
                is_market: is_market_on_trigger,
                trigger_px: px,
                tpsl: match tpsl {
                    TpSl::Tp => "tp",
                    TpSl::Sl => "sl",
                }
                .into(),
            },
        )
        .await
    }

    async fn get_asset_metadata(&self, symbol: &str) -> Result<AssetMetadata, ExchangeError> {
        let entry = self.asset_entry(symbol).await?;
        Ok(AssetMetadata {
            size_decimals: entry.size_decimals,
        })
    }

    async fn get_balance(&self) -> Result<Decimal, ExchangeError> {
        let user = format!("{:?}", self.wallet_address());
        let state = self
            .info(json!({"type": "clearinghouseState", "user": user}))
            .await?;
        let value = state
            .get("marginSummary")
            .and_then(|m| m.get("accountValue"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(Decimal::ZERO);
        Ok(value)
    }

    fn exchange_name(&self) -> &str {
        "Hyperliquid"
    }
}

// ---------------------------------------------------------------------------
// Price / decimal wire formatting
// ---------------------------------------------------------------------------

/// Perp prices allow at most 5 significant figures and `6 - szDecimals`
/// decimal places.
fn round_px(price: Decimal, size_decimals: u32) -> Decimal {
    let max_decimals = 6u32.saturating_sub(size_decimals);
    price.round_sf(5).unwrap_or(price).round_dp(max_decimals)
}

fn wire_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
