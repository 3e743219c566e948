//! Metric recording for load test outcomes. A no-op without the `metrics` feature.
use std::time::Duration;
use surge_core::FailureKind;

#[cfg(feature = "metrics")]
pub(crate) fn request_success(label: &str, elapsed: Duration) {
    metrics::counter!("surge_requests_success", "test" => label.to_string()).increment(1);
    metrics::histogram!("surge_request_latency", "test" => label.to_string())
        .record(elapsed.as_secs_f64());
}

#[cfg(feature = "metrics")]
pub(crate) fn request_failure(label: &str, kind: FailureKind, count: usize) {
    metrics::counter!(
        "surge_requests_failure",
        "test" => label.to_string(),
        "kind" => kind.as_str()
    )
    .increment(count as u64);
}

#[cfg(feature = "metrics")]
pub(crate) fn step_concurrency(label: &str, concurrency: usize) {
    metrics::gauge!("surge_step_concurrency", "test" => label.to_string()).set(concurrency as f64);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn request_success(_label: &str, _elapsed: Duration) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn request_failure(_label: &str, _kind: FailureKind, _count: usize) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn step_concurrency(_label: &str, _concurrency: usize) {}
