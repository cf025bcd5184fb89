//! Scripted exchange double for pipeline/execution tests. Records every call
//! in order so tests can assert sequencing (reconcile before entry, fallback
//! ladders) and pops pre-scripted responses per primitive.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use super::{
    AssetMetadata, CloseOptions, ExchangeClient, ExchangeError, OpenOrder, PositionInfo, TpSl,
    Tif,
};

#[derive(Default)]
pub struct MockExchange {
    pub calls: Mutex<Vec<String>>,
    positions: Mutex<VecDeque<Option<PositionInfo>>>,
    open_orders: Mutex<VecDeque<Vec<OpenOrder>>>,
    close_acks: Mutex<VecDeque<Option<Value>>>,
    order_acks: Mutex<VecDeque<Value>>,
    cancel_acks: Mutex<VecDeque<Value>>,
    balances: Mutex<VecDeque<Result<Decimal, ExchangeError>>>,
    size_decimals: Mutex<u32>,
}

impl MockExchange {
    pub fn new() -> Self {
        let mock = Self::default();
        *mock.size_decimals.lock().unwrap() = 2;
        mock
    }

    pub fn script_position(&self, position: Option<PositionInfo>) {
        self.positions.lock().unwrap().push_back(position);
    }

    pub fn script_open_orders(&self, orders: Vec<OpenOrder>) {
        self.open_orders.lock().unwrap().push_back(orders);
    }

    pub fn script_close_ack(&self, ack: Option<Value>) {
        self.close_acks.lock().unwrap().push_back(ack);
    }

    pub fn script_order_ack(&self, ack: Value) {
        self.order_acks.lock().unwrap().push_back(ack);
    }

    pub fn script_cancel_ack(&self, ack: Value) {
        self.cancel_acks.lock().unwrap().push_back(ack);
    }

    pub fn script_balance(&self, balance: Result<Decimal, ExchangeError>) {
        self.balances.lock().unwrap().push_back(balance);
    }

    pub fn set_size_decimals(&self, decimals: u32) {
        *self.size_decimals.lock().unwrap() = decimals;
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

// Canned acks in the venue's response shape.

pub fn ack_filled(avg_px: &str) -> Value {
    json!({
        "status": "ok",
        "response": {"type": "order", "data": {"statuses": [
            {"filled": {"totalSz": "1", "avgPx": avg_px, "oid": 1}}
        ]}}
    })
}

pub fn ack_resting(oid: u64) -> Value {
    json!({
        "status": "ok",
        "response": {"type": "order", "data": {"statuses": [{"resting": {"oid": oid}}]}}
    })
}

pub fn ack_error(message: &str) -> Value {
    json!({
        "status": "ok",
        "response": {"type": "order", "data": {"statuses": [{"error": message}]}}
    })
}

pub fn ack_cancel_success() -> Value {
    json!({
        "status": "ok",
        "response": {"type": "cancel", "data": {"statuses": ["success"]}}
    })
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn get_position(&self, symbol: &str) -> Result<Option<PositionInfo>, ExchangeError> {
        self.record(format!("get_position:{symbol}"));
        Ok(self.positions.lock().unwrap().pop_front().flatten())
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, ExchangeError> {
        self.record(format!("get_open_orders:{symbol}"));
        Ok(self
            .open_orders
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn close_position(
        &self,
        symbol: &str,
        opts: CloseOptions,
    ) -> Result<Option<Value>, ExchangeError> {
        self.record(format!(
            "close_position:{symbol}:{}",
            if opts.size.is_some() { "sized" } else { "full" }
        ));
        Ok(self
            .close_acks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Some(ack_filled("100"))))
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<Value, ExchangeError> {
        self.record(format!("cancel:{symbol}:{order_id}"));
        Ok(self
            .cancel_acks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(ack_cancel_success))
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        _slippage: Decimal,
    ) -> Result<Value, ExchangeError> {
        let side = if is_buy { "buy" } else { "sell" };
        self.record(format!("market:{symbol}:{side}:{size}"));
        Ok(self
            .order_acks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ack_filled("100")))
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        price: Decimal,
        _tif: Tif,
        reduce_only: bool,
    ) -> Result<Value, ExchangeError> {
        let side = if is_buy { "buy" } else { "sell" };
        let ro = if reduce_only { ":reduce" } else { "" };
        self.record(format!("limit:{symbol}:{side}:{size}:{price}{ro}"));
        Ok(self
            .order_acks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ack_resting(1)))
    }

    async fn place_trigger_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        trigger_price: Decimal,
        _is_market_on_trigger: bool,
        tpsl: TpSl,
        reduce_only: bool,
    ) -> Result<Value, ExchangeError> {
        let side = if is_buy { "buy" } else { "sell" };
        let kind = match tpsl {
            TpSl::Tp => "tp",
            TpSl::Sl => "sl",
        };
        let ro = if reduce_only { ":reduce" } else { "" };
        self.record(format!(
            "trigger:{symbol}:{kind}:{side}:{size}:{trigger_price}{ro}"
        ));
        Ok(self
            .order_acks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ack_resting(2)))
    }

    async fn get_asset_metadata(&self, symbol: &str) -> Result<AssetMetadata, ExchangeError> {
        self.record(format!("get_asset_metadata:{symbol}"));
        Ok(AssetMetadata {
            size_decimals: *self.size_decimals.lock().unwrap(),
        })
    }

    async fn get_balance(&self) -> Result<Decimal, ExchangeError> {
        self.record("get_balance".into());
        self.balances
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(dec!(1000)))
    }

    fn exchange_name(&self) -> &str {
        "MockExchange"
    }
}
