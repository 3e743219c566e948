use std::time::Duration;

/// Success rate at or above which a step counts as healthy.
pub const HEALTHY_SUCCESS_RATE: f64 = 0.90;

/// Consecutive failed requests within a step before the rest of the step is abandoned.
pub const CIRCUIT_BREAKER_THRESHOLD: usize = 10;

pub const DEFAULT_INITIAL_CONCURRENCY: usize = 5;
pub const DEFAULT_STEP_INCREMENT: usize = 5;
pub const DEFAULT_MAX_CONCURRENCY: usize = 100;
pub const DEFAULT_REQUESTS_PER_STEP: usize = 20;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 5;
pub const DEFAULT_STEP_COOLDOWN: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
