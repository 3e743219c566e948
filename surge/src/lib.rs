#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

#[macro_use]
mod macros;

pub mod breakpoint;
mod recorder;
mod step;
mod stop;
mod tester;

cfg_alerts! {
    pub mod alerts;
}

pub use breakpoint::{detect_breakpoint, FailureStreaks};
pub use stop::StopHandle;
pub use tester::LoadTester;

pub use surge_core::{
    Breakpoint, BreakpointReport, ConfigError, Failure, FailureKind, LoadStepResult,
    LoadTestConfig, CIRCUIT_BREAKER_THRESHOLD, HEALTHY_SUCCESS_RATE,
};

pub mod prelude {
    pub use crate::{LoadTester, StopHandle};
    pub use surge_core::{
        BreakpointReport, ConfigError, Failure, FailureKind, LoadStepResult, LoadTestConfig,
    };

    cfg_alerts! {
        pub use crate::alerts::{AlertConfig, AlertLoadTester};
    }
}
