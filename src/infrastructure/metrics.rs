//! Prometheus metrics

use crate::domain::call::{CallDirection, DisconnectCause};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder. Only the first call in a
/// process can succeed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
        )?
        .install_recorder()?;

    describe_metrics();
    Ok(handle)
}

pub fn describe_metrics() {
    describe_counter!("broker_sessions_created_total", "Sessions created, by direction");
    describe_counter!(
        "broker_sessions_disconnected_total",
        "Sessions that reached DISCONNECTED, by cause"
    );
    describe_counter!(
        "broker_provider_events_refused_total",
        "Provider events logged and dropped, by event and reason"
    );
    describe_gauge!("broker_live_sessions", "Sessions not yet disconnected");
    describe_gauge!("broker_attached_controllers", "Currently attached controllers");
    describe_counter!("http_requests_total", "Total number of HTTP requests received");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
}

pub fn record_session_created(direction: CallDirection) {
    let direction = match direction {
        CallDirection::Incoming => "incoming",
        CallDirection::Outgoing => "outgoing",
    };
    counter!("broker_sessions_created_total", "direction" => direction).increment(1);
}

pub fn record_session_disconnected(cause: Option<&DisconnectCause>) {
    let code = cause.map_or("UNKNOWN", |cause| cause.code.as_str());
    counter!("broker_sessions_disconnected_total", "cause" => code).increment(1);
}

pub fn record_provider_event_refused(event: &'static str, reason: &'static str) {
    counter!(
        "broker_provider_events_refused_total",
        "event" => event,
        "reason" => reason
    )
    .increment(1);
}

pub fn set_live_sessions(count: usize) {
    gauge!("broker_live_sessions").set(count as f64);
}

pub fn set_attached_controllers(count: usize) {
    gauge!("broker_attached_controllers").set(count as f64);
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration.as_secs_f64());
}
