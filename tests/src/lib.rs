//! Shared helpers for the surge integration tests.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;
use surge::prelude::*;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

pub fn init() -> &'static PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    HANDLE.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("surge=debug,mock_service=debug")
            .try_init();

        PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install metrics recorder")
    })
}

/// Scenario configuration shared by the end-to-end tests: three steps of ten requests.
pub fn three_steps(label: &str) -> LoadTestConfig {
    LoadTestConfig::new(label)
        .initial_concurrency(5)
        .step_increment(5)
        .max_concurrency(15)
        .requests_per_step(10)
        .max_consecutive_failures(2)
        .step_cooldown(Duration::ZERO)
}

/// Checks the per-step invariants every report must uphold.
pub fn assert_step_invariants(report: &BreakpointReport, requests_per_step: usize) {
    for step in report.steps() {
        assert_eq!(step.successes() + step.failures(), step.requests_sent(), "{step}");
        assert!(step.requests_sent() <= requests_per_step, "{step}");
        assert!((0. ..=1.).contains(&step.success_rate()), "{step}");
        let expected = step.successes() as f64 / step.requests_sent().max(1) as f64;
        assert!((step.success_rate() - expected).abs() < 1e-12, "{step}");
        assert_eq!(
            step.failure_breakdown().values().sum::<usize>(),
            step.failures(),
            "{step}"
        );
    }

    let sent: usize = report.steps().iter().map(|s| s.requests_sent()).sum();
    assert_eq!(sent, report.total_requests());
    assert_eq!(
        report.total_successful() + report.total_failed(),
        report.total_requests()
    );
}
