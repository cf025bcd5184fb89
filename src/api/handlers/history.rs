use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::state::ApiState;
use crate::storage::postgres::{self, ResponseRow, WebhookRow};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    /// Comma-separated strategy ids to filter on.
    pub strategy_ids: Option<String>,
}

impl HistoryQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    fn ids(&self) -> Option<Vec<String>> {
        let raw = self.strategy_ids.as_deref()?;
        let ids: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        (!ids.is_empty()).then_some(ids)
    }
}

pub async fn webhooks(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<WebhookRow>>, ApiError> {
    let db = state.db.as_ref().ok_or(ApiError::ServiceUnavailable)?;
    let ids = query.ids();
    let rows = postgres::recent_webhooks(db, query.limit(), ids.as_deref()).await?;
    Ok(Json(rows))
}

pub async fn responses(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ResponseRow>>, ApiError> {
    let db = state.db.as_ref().ok_or(ApiError::ServiceUnavailable)?;
    let ids = query.ids();
    let rows = postgres::recent_responses(db, query.limit(), ids.as_deref()).await?;
    Ok(Json(rows))
}
