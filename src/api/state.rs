use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

use crate::balance::BalanceCache;
use crate::pipeline::Pipeline;

pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
    pub db: Option<PgPool>,
    pub balance: Arc<BalanceCache>,
    pub environment: String,
    pub exchange_name: String,
    pub start_time: std::time::Instant,
    pub prometheus: PrometheusHandle,
}
