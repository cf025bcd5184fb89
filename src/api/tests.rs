use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower::ServiceExt;

use super::state::ApiState;
use crate::balance::BalanceCache;
use crate::config::Config;
use crate::exchange::mock::{ack_filled, MockExchange};
use crate::pipeline::Pipeline;
use crate::strategy::StrategyRegistry;

fn test_config() -> Config {
    Config {
        database_url: String::new(),
        api_port: 0,
        environment: "testnet".into(),
        hyperliquid_api_url: String::new(),
        hyperliquid_private_key: None,
        settle_after_clear_secs: 0,
        settle_close_to_cancel_ms: 0,
        limit_retry_delay_ms: 0,
        balance_cache_secs: 300,
        balance_cache_rate_limited_secs: 900,
    }
}

fn test_state(mock: Arc<MockExchange>) -> Arc<ApiState> {
    let pipeline = Arc::new(Pipeline::new(
        StrategyRegistry::new(),
        mock.clone(),
        None,
        &test_config(),
    ));
    Arc::new(ApiState {
        pipeline,
        db: None,
        balance: Arc::new(BalanceCache::new(
            mock,
            Duration::from_secs(300),
            Duration::from_secs(900),
        )),
        environment: "testnet".into(),
        exchange_name: "MockExchange".into(),
        start_time: std::time::Instant::now(),
        prometheus: PrometheusBuilder::new().build_recorder().handle(),
    })
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_webhook_executes_and_returns_success_envelope() {
    let mock = Arc::new(MockExchange::new());
    mock.script_order_ack(ack_filled("180.5"));
    let app = super::router(test_state(mock));

    let resp = app
        .oneshot(post_json(
            "/api/webhook/tradingview",
            serde_json::json!({
                "symbol": "SOL", "side": "buy", "entry": "market", "quantity": 12
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["strategy_id"], "OTHERS");
    assert_eq!(json["legs"][0]["kind"], "entry");
    assert_eq!(json["legs"][0]["status"], "success");
}

#[tokio::test]
async fn test_webhook_validation_error_still_answers_200() {
    let mock = Arc::new(MockExchange::new());
    let app = super::router(test_state(mock.clone()));

    let resp = app
        .oneshot(post_json(
            "/api/webhook/tradingview",
            serde_json::json!({
                "symbol": "SOL", "side": "buy", "entry": "limit", "quantity": 1
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["status"], "error");
    assert!(mock.call_log().is_empty());
}

#[tokio::test]
async fn test_strategy_list_and_toggle() {
    let mock = Arc::new(MockExchange::new());
    let state = test_state(mock);
    state.pipeline.registry.ensure("IMBA_HYPER").await;
    let app = super::router(state.clone());

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/strategies")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json[0]["strategy_id"], "IMBA_HYPER");
    assert_eq!(json[0]["enabled"], true);

    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/strategies/IMBA_HYPER/toggle",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["enabled"], false);
}

#[tokio::test]
async fn test_toggle_unknown_strategy_is_404() {
    let mock = Arc::new(MockExchange::new());
    let app = super::router(test_state(mock));

    let resp = app
        .oneshot(post_json(
            "/api/strategies/GHOST/toggle",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_reports_environment_and_balance() {
    let mock = Arc::new(MockExchange::new());
    let app = super::router(test_state(mock));

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["status"], "online");
    assert_eq!(json["environment"], "testnet");
    assert_eq!(json["exchange"], "MockExchange");
    // Mock default balance.
    assert_eq!(json["balance"], 1000.0);
}

#[tokio::test]
async fn test_history_without_database_is_unavailable() {
    let mock = Arc::new(MockExchange::new());
    let app = super::router(test_state(mock));

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/webhooks")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    let mock = Arc::new(MockExchange::new());
    let app = super::router(test_state(mock));

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
