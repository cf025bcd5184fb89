use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::state::ApiState;
use crate::pipeline::ResponseEnvelope;

/// TradingView alert entry point. Always answers 200 with an envelope; the
/// `status` field inside carries the verdict, so alert delivery is never
/// retried by the sender for a trading-level failure.
pub async fn tradingview(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<Value>,
) -> Json<ResponseEnvelope> {
    Json(state.pipeline.handle_webhook(payload).await)
}

#[derive(Deserialize)]
pub struct ReExecuteRequest {
    pub webhook_id: Uuid,
}

/// Replay a stored webhook payload through the full pipeline.
pub async fn re_execute(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ReExecuteRequest>,
) -> Result<Json<ResponseEnvelope>, ApiError> {
    match state.pipeline.re_execute(req.webhook_id).await {
        Some(envelope) => Ok(Json(envelope)),
        None => Err(ApiError::NotFound(format!(
            "webhook {} not found",
            req.webhook_id
        ))),
    }
}
