use crate::{
    ConfigError, DEFAULT_INITIAL_CONCURRENCY, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_REQUESTS_PER_STEP, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_STEP_COOLDOWN, DEFAULT_STEP_INCREMENT,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::time::Duration;

/// Configuration for a step-wise load ramp.
///
/// Every field has a default; use the chained setters to override them.
///
/// # Example
/// ```
/// use surge_core::LoadTestConfig;
/// use std::time::Duration;
///
/// let config = LoadTestConfig::new("search-api")
///     .initial_concurrency(10)
///     .step_increment(10)
///     .max_concurrency(200)
///     .step_cooldown(Duration::from_millis(500));
///
/// assert!(config.validate().is_ok());
/// ```
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadTestConfig {
    pub label: String,
    pub initial_concurrency: usize,
    pub step_increment: usize,
    pub max_concurrency: usize,
    pub requests_per_step: usize,
    pub max_consecutive_failures: usize,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub step_cooldown: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub request_timeout: Duration,
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    pub batch_timeout: Option<Duration>,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self::new("load_test")
    }
}

impl LoadTestConfig {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            initial_concurrency: DEFAULT_INITIAL_CONCURRENCY,
            step_increment: DEFAULT_STEP_INCREMENT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            requests_per_step: DEFAULT_REQUESTS_PER_STEP,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            step_cooldown: DEFAULT_STEP_COOLDOWN,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            batch_timeout: None,
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Concurrency of the first step.
    pub fn initial_concurrency(mut self, concurrency: usize) -> Self {
        self.initial_concurrency = concurrency;
        self
    }

    /// Concurrency added after each step.
    pub fn step_increment(mut self, increment: usize) -> Self {
        self.step_increment = increment;
        self
    }

    /// The ramp ends once the next step would exceed this concurrency.
    pub fn max_concurrency(mut self, concurrency: usize) -> Self {
        self.max_concurrency = concurrency;
        self
    }

    /// Total requests issued within one step, independent of its concurrency.
    pub fn requests_per_step(mut self, requests: usize) -> Self {
        self.requests_per_step = requests;
        self
    }

    /// Consecutive unhealthy steps sharing a failure kind before a breakpoint is declared.
    pub fn max_consecutive_failures(mut self, steps: usize) -> Self {
        self.max_consecutive_failures = steps;
        self
    }

    /// Pause between steps. Not applied before the first or after the last step.
    pub fn step_cooldown(mut self, cooldown: Duration) -> Self {
        self.step_cooldown = cooldown;
        self
    }

    /// Upper bound for a single request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Upper bound for a whole batch. Defaults to twice the request timeout.
    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    pub fn effective_batch_timeout(&self) -> Duration {
        self.batch_timeout.unwrap_or(self.request_timeout * 2)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("initial_concurrency", self.initial_concurrency),
            ("step_increment", self.step_increment),
            ("requests_per_step", self.requests_per_step),
            ("max_consecutive_failures", self.max_consecutive_failures),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero(*name));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::Zero("request_timeout"));
        }

        if self.effective_batch_timeout().is_zero() {
            return Err(ConfigError::Zero("batch_timeout"));
        }

        if self.max_concurrency < self.initial_concurrency {
            return Err(ConfigError::MaxBelowInitial {
                initial: self.initial_concurrency,
                max: self.max_concurrency,
            });
        }

        Ok(())
    }
}
