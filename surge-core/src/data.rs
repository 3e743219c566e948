use crate::{FailureKind, CIRCUIT_BREAKER_THRESHOLD, HEALTHY_SUCCESS_RATE};
use serde::Serialize;
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

/// Outcome of a single load step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadStepResult {
    step: usize,
    concurrency: usize,
    requests_sent: usize,
    successes: usize,
    failures: usize,
    success_rate: f64,
    avg_response_ms: f64,
    min_response_ms: f64,
    max_response_ms: f64,
    failure_breakdown: BTreeMap<FailureKind, usize>,
    short_circuited: usize,
    interrupted: bool,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

impl LoadStepResult {
    /// 1-based index of the step within its run.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Target concurrency of the step.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn requests_sent(&self) -> usize {
        self.requests_sent
    }

    pub fn successes(&self) -> usize {
        self.successes
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    pub fn avg_response_ms(&self) -> f64 {
        self.avg_response_ms
    }

    pub fn min_response_ms(&self) -> f64 {
        self.min_response_ms
    }

    pub fn max_response_ms(&self) -> f64 {
        self.max_response_ms
    }

    pub fn failure_breakdown(&self) -> &BTreeMap<FailureKind, usize> {
        &self.failure_breakdown
    }

    /// Failures of `kind` recorded in this step.
    pub fn failure_count(&self, kind: FailureKind) -> usize {
        self.failure_breakdown.get(&kind).copied().unwrap_or(0)
    }

    /// Requests recorded as failed without being sent, after the circuit breaker tripped.
    pub fn short_circuited(&self) -> usize {
        self.short_circuited
    }

    /// Whether a stop request cut the step short.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn is_healthy(&self) -> bool {
        self.success_rate >= HEALTHY_SUCCESS_RATE
    }
}

impl fmt::Display for LoadStepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step={} concurrency={} sent={} ok={} failed={} rate={:.1}% avg={:.1}ms min={:.1}ms max={:.1}ms",
            self.step,
            self.concurrency,
            self.requests_sent,
            self.successes,
            self.failures,
            self.success_rate * 100.,
            self.avg_response_ms,
            self.min_response_ms,
            self.max_response_ms,
        )?;

        if !self.failure_breakdown.is_empty() {
            let kinds: Vec<_> = self
                .failure_breakdown
                .iter()
                .map(|(kind, count)| format!("{kind}={count}"))
                .collect();
            write!(f, " failures=[{}]", kinds.join(", "))?;
        }

        Ok(())
    }
}

/// Accumulates request outcomes for one step.
#[derive(Debug, Default)]
pub struct StepTally {
    successes: usize,
    failures: BTreeMap<FailureKind, usize>,
    response_times: Vec<Duration>,
    consecutive_failures: usize,
    tripped: bool,
    short_circuited: usize,
    interrupted: bool,
}

impl StepTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, elapsed: Duration) {
        self.successes += 1;
        self.consecutive_failures = 0;
        self.response_times.push(elapsed);
    }

    /// Records a failure. `elapsed` is `None` when no response time was observed.
    pub fn record_failure(&mut self, kind: FailureKind, elapsed: Option<Duration>) {
        *self.failures.entry(kind).or_default() += 1;
        self.consecutive_failures += 1;
        self.tripped |= self.consecutive_failures >= CIRCUIT_BREAKER_THRESHOLD;
        if let Some(elapsed) = elapsed {
            self.response_times.push(elapsed);
        }
    }

    /// Records `count` unsent requests as failures of the dominant kind so far.
    pub fn short_circuit(&mut self, count: usize) -> FailureKind {
        let kind = self.dominant_failure();
        if count > 0 {
            *self.failures.entry(kind).or_default() += count;
            self.short_circuited += count;
        }
        kind
    }

    pub fn interrupt(&mut self) {
        self.interrupted = true;
    }

    /// Most frequent failure kind, earliest kind on ties, [`FailureKind::Unknown`] when none.
    pub fn dominant_failure(&self) -> FailureKind {
        let mut best: Option<(FailureKind, usize)> = None;
        for (kind, count) in &self.failures {
            match best {
                Some((_, top)) if *count <= top => {}
                _ => best = Some((*kind, *count)),
            }
        }
        best.map(|(kind, _)| kind).unwrap_or(FailureKind::Unknown)
    }

    /// Failures since the last success.
    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    /// Whether the circuit breaker threshold was reached at any point in the step. Stays set
    /// after a later success.
    pub fn tripped(&self) -> bool {
        self.tripped
    }

    pub fn finish(self, step: usize, concurrency: usize) -> LoadStepResult {
        let failures: usize = self.failures.values().sum();
        let requests_sent = self.successes + failures;
        let success_rate = self.successes as f64 / requests_sent.max(1) as f64;

        let millis: Vec<f64> = self
            .response_times
            .iter()
            .map(|d| d.as_secs_f64() * 1_000.)
            .collect();
        let (avg, min, max) = if millis.is_empty() {
            (0., 0., 0.)
        } else {
            (
                millis.iter().sum::<f64>() / millis.len() as f64,
                millis.iter().copied().fold(f64::INFINITY, f64::min),
                millis.iter().copied().fold(0., f64::max),
            )
        };

        LoadStepResult {
            step,
            concurrency,
            requests_sent,
            successes: self.successes,
            failures,
            success_rate,
            avg_response_ms: avg,
            min_response_ms: min,
            max_response_ms: max,
            failure_breakdown: self.failures,
            short_circuited: self.short_circuited,
            interrupted: self.interrupted,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// The load level at which a run judged the system to be over capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    pub step: usize,
    pub concurrency: usize,
    pub kind: FailureKind,
    pub consecutive: usize,
    pub message: String,
}

/// Outcome of a full load ramp.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakpointReport {
    label: String,
    detected: bool,
    breakpoint_step: Option<usize>,
    max_healthy_load: usize,
    failure_type: Option<FailureKind>,
    consecutive_failures: usize,
    total_requests: usize,
    total_successful: usize,
    total_failed: usize,
    #[serde(with = "time::serde::rfc3339")]
    started_at: OffsetDateTime,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    duration: Duration,
    steps_completed: usize,
    message: String,
    steps: Vec<LoadStepResult>,
}

impl BreakpointReport {
    /// Label of the API or request type under test.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    pub fn breakpoint_step(&self) -> Option<usize> {
        self.breakpoint_step
    }

    /// Highest concurrency of any healthy step, `0` when no step was healthy.
    pub fn max_healthy_load(&self) -> usize {
        self.max_healthy_load
    }

    pub fn failure_type(&self) -> Option<FailureKind> {
        self.failure_type
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    pub fn total_requests(&self) -> usize {
        self.total_requests
    }

    pub fn total_successful(&self) -> usize {
        self.total_successful
    }

    pub fn total_failed(&self) -> usize {
        self.total_failed
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Steps that ran to completion. A step cut short by a stop request is not counted.
    pub fn steps_completed(&self) -> usize {
        self.steps_completed
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn steps(&self) -> &[LoadStepResult] {
        &self.steps
    }

    pub fn success_rate(&self) -> f64 {
        self.total_successful as f64 / self.total_requests.max(1) as f64
    }

    pub fn to_log_message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BreakpointReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Load test report [{}]", self.label)?;
        writeln!(
            f,
            "  breakpoint: {}",
            match (self.breakpoint_step, self.failure_type) {
                (Some(step), Some(kind)) => format!(
                    "step {step} ({kind}, {} consecutive)",
                    self.consecutive_failures
                ),
                _ => "none".to_string(),
            }
        )?;
        writeln!(f, "  max healthy load: {}", self.max_healthy_load)?;
        writeln!(
            f,
            "  requests: {} total, {} ok, {} failed ({:.1}% success)",
            self.total_requests,
            self.total_successful,
            self.total_failed,
            self.success_rate() * 100.,
        )?;
        writeln!(
            f,
            "  steps: {} completed in {}",
            self.steps_completed,
            humantime::format_duration(Duration::from_millis(self.duration.as_millis() as u64)),
        )?;
        for step in &self.steps {
            writeln!(f, "    {step}")?;
        }
        write!(f, "  {}", self.message)
    }
}

/// Collects step results over a run and produces the final [`BreakpointReport`].
#[derive(Debug)]
pub struct ReportBuilder {
    label: String,
    started_at: OffsetDateTime,
    steps: Vec<LoadStepResult>,
    max_healthy_load: usize,
}

impl ReportBuilder {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            started_at: OffsetDateTime::now_utc(),
            steps: vec![],
            max_healthy_load: 0,
        }
    }

    pub fn push(&mut self, step: LoadStepResult) {
        if step.is_healthy() && !step.interrupted() {
            self.max_healthy_load = self.max_healthy_load.max(step.concurrency());
        }
        self.steps.push(step);
    }

    pub fn max_healthy_load(&self) -> usize {
        self.max_healthy_load
    }

    pub fn steps(&self) -> &[LoadStepResult] {
        &self.steps
    }

    /// `stopped` marks runs ended by a stop request rather than by reaching the maximum load.
    pub fn finish(
        self,
        breakpoint: Option<Breakpoint>,
        duration: Duration,
        stopped: bool,
    ) -> BreakpointReport {
        let total_requests = self.steps.iter().map(LoadStepResult::requests_sent).sum();
        let total_successful = self.steps.iter().map(LoadStepResult::successes).sum();
        let total_failed = self.steps.iter().map(LoadStepResult::failures).sum();
        let steps_completed = self.steps.iter().filter(|s| !s.interrupted()).count();
        let last_concurrency = self
            .steps
            .last()
            .map(LoadStepResult::concurrency)
            .unwrap_or(0);

        let (detected, breakpoint_step, failure_type, consecutive_failures, message) =
            match breakpoint {
                Some(bp) => (
                    true,
                    Some(bp.step),
                    Some(bp.kind),
                    bp.consecutive,
                    bp.message,
                ),
                None if stopped => (
                    false,
                    None,
                    None,
                    0,
                    format!(
                        "Stopped after {steps_completed} steps at {last_concurrency} concurrent requests; no breakpoint detected."
                    ),
                ),
                None => (
                    false,
                    None,
                    None,
                    0,
                    format!(
                        "No breakpoint detected up to {last_concurrency} concurrent requests; max healthy load {}.",
                        self.max_healthy_load
                    ),
                ),
            };

        BreakpointReport {
            label: self.label,
            detected,
            breakpoint_step,
            max_healthy_load: self.max_healthy_load,
            failure_type,
            consecutive_failures,
            total_requests,
            total_successful,
            total_failed,
            started_at: self.started_at,
            duration,
            steps_completed,
            message,
            steps: self.steps,
        }
    }
}
