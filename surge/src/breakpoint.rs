//! Breakpoint detection across consecutive steps
use std::collections::BTreeMap;
use surge_core::{Breakpoint, FailureKind, LoadStepResult};

/// Number of consecutive steps in which each failure kind has appeared.
///
/// Owned by the run loop and threaded through [`detect_breakpoint`] after every step.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FailureStreaks {
    streaks: BTreeMap<FailureKind, usize>,
}

impl FailureStreaks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: FailureKind) -> usize {
        self.streaks.get(&kind).copied().unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.streaks.clear();
    }

    fn update(&mut self, step: &LoadStepResult) {
        for kind in FailureKind::ALL {
            if step.failure_count(kind) > 0 {
                *self.streaks.entry(kind).or_default() += 1;
            } else {
                self.streaks.remove(&kind);
            }
        }
    }

    /// Kind with the longest streak at or above `threshold`; earliest kind on ties.
    fn longest_at_least(&self, threshold: usize) -> Option<(FailureKind, usize)> {
        let mut best: Option<(FailureKind, usize)> = None;
        for (&kind, &streak) in &self.streaks {
            if streak < threshold {
                continue;
            }
            match best {
                Some((_, top)) if streak <= top => {}
                _ => best = Some((kind, streak)),
            }
        }
        best
    }
}

/// Decides whether `step` marks the breakpoint of the run.
///
/// Rules, in order:
/// 1. Any unauthorized failure is an immediate breakpoint. This points at configuration, not
///    capacity.
/// 2. A healthy step clears every streak.
/// 3. Otherwise the failure kind whose streak reached `max_consecutive` wins. When several do,
///    the longest streak wins.
pub fn detect_breakpoint(
    step: &LoadStepResult,
    streaks: &mut FailureStreaks,
    max_consecutive: usize,
) -> Option<Breakpoint> {
    streaks.update(step);

    let unauthorized = step.failure_count(FailureKind::Unauthorized);
    if unauthorized > 0 {
        return Some(Breakpoint {
            step: step.step(),
            concurrency: step.concurrency(),
            kind: FailureKind::Unauthorized,
            consecutive: streaks.get(FailureKind::Unauthorized),
            message: format!(
                "Authentication failed at step {} ({} concurrent): {unauthorized} unauthorized responses. \
                 Check the credentials and endpoint configuration; this is not a capacity limit.",
                step.step(),
                step.concurrency(),
            ),
        });
    }

    if step.is_healthy() {
        streaks.reset();
        return None;
    }

    let (kind, consecutive) = streaks.longest_at_least(max_consecutive)?;
    Some(Breakpoint {
        step: step.step(),
        concurrency: step.concurrency(),
        kind,
        consecutive,
        message: format!(
            "Capacity reached at {} concurrent requests: {kind} failures in {consecutive} consecutive steps \
             (success rate {:.1}% at step {}).",
            step.concurrency(),
            step.success_rate() * 100.,
            step.step(),
        ),
    })
}
