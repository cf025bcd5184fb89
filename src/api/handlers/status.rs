use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::api::state::ApiState;
use crate::storage::postgres::{self, StorageStats};

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub environment: String,
    pub exchange: String,
    pub uptime_secs: u64,
    pub strategies: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageStats>,
}

pub async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let balance = match state.balance.get().await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "balance_unavailable_for_status");
            None
        }
    };

    let storage = match state.db.as_ref() {
        Some(db) => match postgres::stats(db).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "storage_stats_unavailable");
                None
            }
        },
        None => None,
    };

    Json(StatusResponse {
        status: "online",
        environment: state.environment.clone(),
        exchange: state.exchange_name.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        strategies: state.pipeline.registry.ids().await.len(),
        balance,
        storage,
    })
}
