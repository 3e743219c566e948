//! Step-wise load ramp and its run loop
use crate::breakpoint::{detect_breakpoint, FailureStreaks};
use crate::recorder;
use crate::step::run_step;
use crate::stop::StopHandle;
use std::future::Future;
use std::time::Instant;
use surge_core::{BreakpointReport, ConfigError, Failure, LoadTestConfig, ReportBuilder};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Drives a request operation at step-wise increasing concurrency until the maximum
/// concurrency is reached or a breakpoint is detected.
///
/// The operation performs exactly one unit of work per call. `Ok` counts as a success; `Err`
/// is converted into a [`Failure`] and classified.
///
/// # Example
/// ```no_run
/// use surge::prelude::*;
///
/// # async fn check() -> Result<(), ConfigError> {
/// let config = LoadTestConfig::new("health")
///     .initial_concurrency(5)
///     .max_concurrency(50);
///
/// let tester = LoadTester::new(config, || async {
///     // One request against the system under test.
///     Ok::<_, Failure>(())
/// })?;
///
/// let report = tester.run().await;
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
pub struct LoadTester<T> {
    func: T,
    config: LoadTestConfig,
    stop: StopHandle,
}

impl<T> LoadTester<T> {
    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Requests a graceful stop. Safe to call from any thread, at any time.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

impl<T, F, R, E> LoadTester<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = Result<R, E>> + Send + 'static,
    E: Into<Failure>,
{
    pub fn new(config: LoadTestConfig, func: T) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(config, func, StopHandle::new()))
    }

    /// Builds a tester around an already validated config, sharing `stop`.
    pub(crate) fn from_parts(config: LoadTestConfig, func: T, stop: StopHandle) -> Self {
        Self { func, config, stop }
    }

    /// Runs the ramp to completion. Never fails; every request failure ends up in the report.
    #[instrument(name = "load_test", skip_all, fields(label = %self.config.label))]
    pub async fn run(&self) -> BreakpointReport {
        let config = &self.config;
        info!(
            "Starting load test: concurrency {}..={} step {}, {} requests per step",
            config.initial_concurrency,
            config.max_concurrency,
            config.step_increment,
            config.requests_per_step,
        );

        let start = Instant::now();
        let mut report = ReportBuilder::new(&config.label);
        let mut streaks = FailureStreaks::new();
        let mut concurrency = config.initial_concurrency;
        let mut step = 0;
        let mut breakpoint = None;

        while concurrency <= config.max_concurrency && !self.stop.is_stopped() {
            step += 1;
            debug!("Step {step} at {concurrency} concurrent requests");
            recorder::step_concurrency(&config.label, concurrency);

            let result = run_step(&self.func, config, &self.stop, step, concurrency).await;
            info!("{result}");

            let found = if result.interrupted() {
                None
            } else {
                detect_breakpoint(&result, &mut streaks, config.max_consecutive_failures)
            };
            report.push(result);

            if let Some(bp) = found {
                warn!("{}", bp.message);
                breakpoint = Some(bp);
                break;
            }

            concurrency = concurrency.saturating_add(config.step_increment);
            if concurrency <= config.max_concurrency
                && !config.step_cooldown.is_zero()
                && self.stop.sleep(config.step_cooldown).await
            {
                debug!("Stop requested during cooldown");
            }
        }

        let stopped = breakpoint.is_none()
            && self.stop.is_stopped()
            && concurrency <= config.max_concurrency;
        if stopped {
            info!("Load test stopped before reaching max concurrency");
        }

        let report = report.finish(breakpoint, start.elapsed(), stopped);
        info!(
            "Load test complete: {} steps, {}/{} requests succeeded, max healthy load {}",
            report.steps_completed(),
            report.total_successful(),
            report.total_requests(),
            report.max_healthy_load(),
        );
        report
    }
}
