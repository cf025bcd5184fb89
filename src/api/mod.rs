pub mod error;
pub mod handlers;
pub mod state;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use state::ApiState;

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route(
            "/api/webhook/tradingview",
            post(handlers::webhook::tradingview),
        )
        .route(
            "/api/webhook/re-execute",
            post(handlers::webhook::re_execute),
        )
        .route("/api/webhooks", get(handlers::history::webhooks))
        .route("/api/responses", get(handlers::history::responses))
        .route("/api/strategies", get(handlers::strategy::list))
        .route("/api/strategies/ids", get(handlers::strategy::ids))
        .route(
            "/api/strategies/{id}/toggle",
            post(handlers::strategy::toggle),
        )
        .route("/api/status", get(handlers::status::status))
        .route("/metrics", get(handlers::metrics::render))
        .with_state(state)
}

pub async fn serve(state: Arc<ApiState>, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!(port, "api_listening");
    axum::serve(listener, app).await?;
    Ok(())
}
