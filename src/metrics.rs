use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// ---------------------------------------------------------------------------
// Metric name constants
// ---------------------------------------------------------------------------

pub const WEBHOOKS_TOTAL: &str = "signalbridge_webhooks_total";
pub const WEBHOOKS_FAILED: &str = "signalbridge_webhooks_failed_total";
pub const LEGS_TOTAL: &str = "signalbridge_legs_total";
pub const RECONCILE_FALLBACKS_TOTAL: &str = "signalbridge_reconcile_fallbacks_total";
pub const PIPELINE_DURATION: &str = "signalbridge_pipeline_duration_seconds";
pub const EXCHANGE_CALL_DURATION: &str = "signalbridge_exchange_call_duration_seconds";
pub const UPTIME_SECONDS: &str = "signalbridge_uptime_seconds";

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

pub fn init() -> PrometheusHandle {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(PIPELINE_DURATION.to_string()),
            &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0],
        )
        .expect("failed to set pipeline buckets")
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(EXCHANGE_CALL_DURATION.to_string()),
            &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
        )
        .expect("failed to set exchange buckets");

    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus metrics recorder");

    describe_metrics();

    handle
}

fn describe_metrics() {
    metrics::describe_counter!(WEBHOOKS_TOTAL, "Total webhooks received");
    metrics::describe_counter!(WEBHOOKS_FAILED, "Webhooks that ended in an error envelope");
    metrics::describe_counter!(LEGS_TOTAL, "Order legs sent to the exchange, by kind and status");
    metrics::describe_counter!(
        RECONCILE_FALLBACKS_TOTAL,
        "Position closes that needed the reduce-only fallback"
    );
    metrics::describe_histogram!(
        PIPELINE_DURATION,
        "End-to-end webhook pipeline duration (seconds)"
    );
    metrics::describe_histogram!(
        EXCHANGE_CALL_DURATION,
        "Individual exchange call duration (seconds)"
    );
    metrics::describe_gauge!(UPTIME_SECONDS, "Seconds since the bridge started");
}
