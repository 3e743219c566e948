use thiserror::Error;

/// Rejected load test configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    #[error("max concurrency ({max}) is below the initial concurrency ({initial})")]
    MaxBelowInitial { initial: usize, max: usize },
}
