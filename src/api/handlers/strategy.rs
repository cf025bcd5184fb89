use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::state::ApiState;
use crate::strategy::StrategyRule;

pub async fn list(State(state): State<Arc<ApiState>>) -> Json<Vec<StrategyRule>> {
    Json(state.pipeline.registry.snapshot().await)
}

pub async fn ids(State(state): State<Arc<ApiState>>) -> Json<Vec<String>> {
    Json(state.pipeline.registry.ids().await)
}

#[derive(Serialize)]
pub struct ToggleResponse {
    pub strategy_id: String,
    pub enabled: bool,
}

pub async fn toggle(
    State(state): State<Arc<ApiState>>,
    Path(strategy_id): Path<String>,
) -> Result<Json<ToggleResponse>, ApiError> {
    match state.pipeline.registry.toggle(&strategy_id).await {
        Some(enabled) => Ok(Json(ToggleResponse {
            strategy_id,
            enabled,
        })),
        None => Err(ApiError::NotFound(format!(
            "strategy {strategy_id} not found"
        ))),
    }
}
