use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::assets::AssetRulesCache;
use crate::config::Config;
use crate::exchange::ExchangeClient;
use crate::execution::executor::OrderExecutor;
use crate::execution::planner;
use crate::execution::reconciler::{PositionReconciler, ReconcileReport};
use crate::execution::LegRecord;
use crate::metrics::{PIPELINE_DURATION, WEBHOOKS_FAILED, WEBHOOKS_TOTAL};
use crate::signal::{self, DEFAULT_STRATEGY_ID};
use crate::strategy::StrategyRegistry;
use crate::storage::postgres;

// ---------------------------------------------------------------------------
// SymbolLocks
// ---------------------------------------------------------------------------

/// One mutex per symbol. Signals for the same symbol run strictly one at a
/// time; reconcile-then-enter is not atomic on the venue, so two interleaved
/// signals could otherwise compound into a stale position.
#[derive(Default)]
pub struct SymbolLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SymbolLocks {
    pub async fn acquire(&self, symbol: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap();
            map.entry(symbol.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

// ---------------------------------------------------------------------------
// ResponseEnvelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Error,
    Skipped,
}

impl EnvelopeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeStatus::Success => "success",
            EnvelopeStatus::Error => "error",
            EnvelopeStatus::Skipped => "skipped",
        }
    }
}

/// The document returned to the webhook caller and persisted verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: EnvelopeStatus,
    pub webhook_id: Uuid,
    pub strategy_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub legs: Vec<LegRecord>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reconcile: Option<ReconcileReport>,
}

impl ResponseEnvelope {
    fn new(status: EnvelopeStatus, webhook_id: Uuid, strategy_id: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            webhook_id,
            strategy_id: strategy_id.to_string(),
            message: message.into(),
            legs: Vec::new(),
            reconcile: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    pub registry: StrategyRegistry,
    exchange: Arc<dyn ExchangeClient>,
    assets: AssetRulesCache,
    reconciler: PositionReconciler,
    executor: OrderExecutor,
    locks: SymbolLocks,
    db: Option<PgPool>,
    settle_after_clear: Duration,
}

impl Pipeline {
    pub fn new(
        registry: StrategyRegistry,
        exchange: Arc<dyn ExchangeClient>,
        db: Option<PgPool>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            assets: AssetRulesCache::new(exchange.clone()),
            reconciler: PositionReconciler::new(
                exchange.clone(),
                Duration::from_millis(config.settle_close_to_cancel_ms),
            ),
            executor: OrderExecutor::new(
                exchange.clone(),
                Duration::from_millis(config.limit_retry_delay_ms),
            ),
            locks: SymbolLocks::default(),
            settle_after_clear: Duration::from_secs(config.settle_after_clear_secs),
            exchange,
            db,
        }
    }

    /// Run one webhook through parse, reconcile, plan, execute, record.
    /// Always returns an envelope; persistence failures are logged, never
    /// surfaced to the caller.
    pub async fn handle_webhook(&self, payload: Value) -> ResponseEnvelope {
        let webhook_id = Uuid::new_v4();
        let started = Instant::now();
        metrics::counter!(WEBHOOKS_TOTAL).increment(1);

        let strategy_hint = payload
            .get("strategy_id")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_STRATEGY_ID)
            .to_string();
        self.record_webhook(webhook_id, &strategy_hint, &payload).await;

        let envelope = self.process(webhook_id, &payload).await;

        self.record_response(webhook_id, &envelope).await;
        if envelope.status == EnvelopeStatus::Error {
            metrics::counter!(WEBHOOKS_FAILED).increment(1);
        }
        metrics::histogram!(PIPELINE_DURATION).record(started.elapsed().as_secs_f64());

        info!(
            webhook_id = %webhook_id,
            strategy_id = %envelope.strategy_id,
            status = envelope.status.as_str(),
            "webhook_processed"
        );
        envelope
    }

    async fn process(&self, webhook_id: Uuid, payload: &Value) -> ResponseEnvelope {
        let (signal, rule) = match signal::parse(payload, &self.registry).await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(webhook_id = %webhook_id, error = %e, "signal_rejected");
                return ResponseEnvelope::new(
                    EnvelopeStatus::Error,
                    webhook_id,
                    DEFAULT_STRATEGY_ID,
                    e.to_string(),
                );
            }
        };

        // Disabled strategies bail out before any exchange traffic.
        if !rule.enabled {
            warn!(webhook_id = %webhook_id, strategy_id = %signal.strategy_id, "strategy_disabled");
            return ResponseEnvelope::new(
                EnvelopeStatus::Skipped,
                webhook_id,
                &signal.strategy_id,
                format!("strategy {} is disabled", signal.strategy_id),
            );
        }

        let _guard = self.locks.acquire(&signal.symbol).await;

        let rules = match self.assets.rules_for(&signal.symbol).await {
            Ok(rules) => rules,
            Err(e) => {
                return ResponseEnvelope::new(
                    EnvelopeStatus::Error,
                    webhook_id,
                    &signal.strategy_id,
                    format!("asset lookup failed: {e}"),
                );
            }
        };

        let reconcile = match self.reconciler.clear_symbol(&signal.symbol).await {
            Ok(report) => report,
            Err(e) => {
                return ResponseEnvelope::new(
                    EnvelopeStatus::Error,
                    webhook_id,
                    &signal.strategy_id,
                    format!("reconciliation failed: {e}"),
                );
            }
        };
        // Never stack a new position on top of one that would not close.
        if !reconcile.cleared {
            warn!(
                webhook_id = %webhook_id,
                symbol = %signal.symbol,
                "symbol_not_cleared_aborting_entry"
            );
            let mut envelope = ResponseEnvelope::new(
                EnvelopeStatus::Error,
                webhook_id,
                &signal.strategy_id,
                format!("could not clear existing exposure on {}", signal.symbol),
            );
            envelope.reconcile = Some(reconcile);
            return envelope;
        }
        tokio::time::sleep(self.settle_after_clear).await;

        let legs = match planner::plan(&signal, &rules) {
            Ok(legs) => legs,
            Err(e) => {
                let mut envelope = ResponseEnvelope::new(
                    EnvelopeStatus::Error,
                    webhook_id,
                    &signal.strategy_id,
                    e.to_string(),
                );
                envelope.reconcile = Some(reconcile);
                return envelope;
            }
        };

        let report = self.executor.execute(&signal, &rules, &legs).await;

        let (status, message) = if report.entry_filled {
            (
                EnvelopeStatus::Success,
                format!("order executed on {}", self.exchange.exchange_name()),
            )
        } else {
            let reason = report
                .legs
                .first()
                .and_then(|l| l.message.clone())
                .unwrap_or_else(|| "entry order failed".into());
            (EnvelopeStatus::Error, reason)
        };

        let mut envelope = ResponseEnvelope::new(status, webhook_id, &signal.strategy_id, message);
        envelope.legs = report.legs;
        envelope.reconcile = Some(reconcile);
        envelope
    }

    /// Re-run a previously stored webhook payload by id.
    pub async fn re_execute(&self, webhook_id: Uuid) -> Option<ResponseEnvelope> {
        let db = self.db.as_ref()?;
        match postgres::webhook_payload(db, webhook_id).await {
            Ok(Some(row)) => Some(self.handle_webhook(row.payload).await),
            Ok(None) => None,
            Err(e) => {
                error!(webhook_id = %webhook_id, error = %e, "webhook_lookup_failed");
                None
            }
        }
    }

    async fn record_webhook(&self, webhook_id: Uuid, strategy_id: &str, payload: &Value) {
        let Some(db) = self.db.as_ref() else { return };
        if let Err(e) = postgres::insert_webhook(db, webhook_id, strategy_id, payload).await {
            error!(webhook_id = %webhook_id, error = %e, "webhook_persist_failed");
        }
    }

    async fn record_response(&self, webhook_id: Uuid, envelope: &ResponseEnvelope) {
        let Some(db) = self.db.as_ref() else { return };
        let document = match serde_json::to_value(envelope) {
            Ok(v) => v,
            Err(e) => {
                error!(webhook_id = %webhook_id, error = %e, "envelope_serialization_failed");
                return;
            }
        };
        if let Err(e) = postgres::insert_response(
            db,
            webhook_id,
            &envelope.strategy_id,
            envelope.status.as_str(),
            &document,
        )
        .await
        {
            error!(webhook_id = %webhook_id, error = %e, "response_persist_failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
