use crate::recorder;
use crate::stop::StopHandle;
use std::future::Future;
use std::time::Duration;
use surge_core::{
    Failure, FailureKind, LoadStepResult, LoadTestConfig, StepTally, CIRCUIT_BREAKER_THRESHOLD,
};
use tokio::task::JoinSet;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

enum Outcome {
    Success(Duration),
    Failure(Failure, Duration),
}

/// Runs one step: `requests_per_step` requests split into batches of at most `concurrency`.
pub(crate) async fn run_step<T, F, R, E>(
    func: &T,
    config: &LoadTestConfig,
    stop: &StopHandle,
    step: usize,
    concurrency: usize,
) -> LoadStepResult
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = Result<R, E>> + Send + 'static,
    E: Into<Failure>,
{
    let mut tally = StepTally::new();
    let mut remaining = config.requests_per_step;
    let mut batch = 0;

    while remaining > 0 {
        if stop.is_stopped() {
            debug!("Stop requested; abandoning step {step} with {remaining} requests unsent");
            tally.interrupt();
            break;
        }

        let size = concurrency.min(remaining);
        batch += 1;
        debug!("Step {step} batch {batch}: dispatching {size} requests");

        run_batch(func, config, size, &mut tally).await;
        remaining -= size;

        if remaining > 0 && tally.tripped() {
            let kind = tally.short_circuit(remaining);
            recorder::request_failure(&config.label, kind, remaining);
            warn!(
                "Circuit breaker tripped at step {step} after {CIRCUIT_BREAKER_THRESHOLD} consecutive failures; \
                 recording {remaining} unsent requests as {kind}",
            );
            break;
        }
    }

    tally.finish(step, concurrency)
}

/// Dispatches `size` requests at once and waits for them, bounded by the batch timeout.
///
/// Requests still outstanding at the deadline count as timeouts. Their tasks are detached
/// rather than aborted.
async fn run_batch<T, F, R, E>(func: &T, config: &LoadTestConfig, size: usize, tally: &mut StepTally)
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = Result<R, E>> + Send + 'static,
    E: Into<Failure>,
{
    let request_timeout = config.request_timeout;
    let mut set = JoinSet::new();

    for _ in 0..size {
        let func = func.clone();
        set.spawn(async move {
            let start = Instant::now();
            let res = tokio::time::timeout(request_timeout, func()).await;
            let elapsed = start.elapsed();
            match res {
                Ok(Ok(_)) => Outcome::Success(elapsed),
                Ok(Err(err)) => Outcome::Failure(err.into(), elapsed),
                Err(_) => Outcome::Failure(
                    Failure::new(
                        FailureKind::Timeout,
                        format!(
                            "request timed out after {}",
                            humantime::format_duration(request_timeout)
                        ),
                    ),
                    elapsed,
                ),
            }
        });
    }

    let deadline = Instant::now() + config.effective_batch_timeout();
    let mut collected = 0;
    loop {
        match tokio::time::timeout_at(deadline, set.join_next()).await {
            Ok(Some(Ok(Outcome::Success(elapsed)))) => {
                collected += 1;
                tally.record_success(elapsed);
                recorder::request_success(&config.label, elapsed);
            }
            Ok(Some(Ok(Outcome::Failure(failure, elapsed)))) => {
                collected += 1;
                trace!("Request failed: {failure}");
                tally.record_failure(failure.kind(), Some(elapsed));
                recorder::request_failure(&config.label, failure.kind(), 1);
            }
            Ok(Some(Err(err))) => {
                collected += 1;
                error!("Request task did not complete: {err}");
                tally.record_failure(FailureKind::Unknown, None);
                recorder::request_failure(&config.label, FailureKind::Unknown, 1);
            }
            Ok(None) => break,
            Err(_) => {
                let outstanding = size - collected;
                warn!(
                    "Batch exceeded {}; counting {outstanding} outstanding requests as timeouts",
                    humantime::format_duration(config.effective_batch_timeout()),
                );
                for _ in 0..outstanding {
                    tally.record_failure(FailureKind::Timeout, None);
                }
                recorder::request_failure(&config.label, FailureKind::Timeout, outstanding);
                set.detach_all();
                break;
            }
        }
    }
}
