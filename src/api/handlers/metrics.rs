use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::api::state::ApiState;
use crate::metrics::UPTIME_SECONDS;

pub async fn render(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    metrics::gauge!(UPTIME_SECONDS).set(state.start_time.elapsed().as_secs() as f64);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}
