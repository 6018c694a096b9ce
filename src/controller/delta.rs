// Cumulative counter to per-interval delta
// (c) 2024 Ross Younger

use tracing::warn;

use super::{DropCount, DropDelta};

/// What one sample of the drop counter told us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First sample; there is nothing to compare it with yet
    Baseline,
    /// The counter went up by this much (possibly zero)
    Increase(DropDelta),
    /// The counter went backwards, most likely because the queueing discipline was
    /// recreated. No congestion is inferred from this sample.
    CounterReset {
        /// The counter before the reset
        previous: DropCount,
        /// The counter now
        current: DropCount,
    },
}

impl Observation {
    /// The drop delta to feed to the policy. Never negative.
    #[must_use]
    pub fn delta(&self) -> DropDelta {
        match self {
            Observation::Increase(d) => *d,
            Observation::Baseline | Observation::CounterReset { .. } => 0,
        }
    }

    /// Did the counter reset?
    #[must_use]
    pub fn is_reset(&self) -> bool {
        matches!(self, Observation::CounterReset { .. })
    }
}

/// Compares two successive counter readings
#[must_use]
pub fn compute_delta(previous: DropCount, current: DropCount) -> Observation {
    match current.checked_sub(previous) {
        Some(d) => Observation::Increase(d),
        None => Observation::CounterReset { previous, current },
    }
}

/// Remembers the previous counter reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaTracker {
    baseline: Option<DropCount>,
}

impl DeltaTracker {
    /// Creates a tracker which already knows the previous reading
    #[must_use]
    pub fn with_baseline(baseline: DropCount) -> Self {
        Self {
            baseline: Some(baseline),
        }
    }

    /// The most recent reading, if there has been one
    #[must_use]
    pub fn baseline(&self) -> Option<DropCount> {
        self.baseline
    }

    /// Accounts for a new reading, which becomes the baseline for the next.
    pub fn observe(&mut self, current: DropCount) -> Observation {
        let observation = match self.baseline {
            None => Observation::Baseline,
            Some(previous) => compute_delta(previous, current),
        };
        if let Observation::CounterReset { previous, current } = observation {
            warn!("counter reset detected: drops went from {previous} to {current}");
        }
        self.baseline = Some(current);
        observation
    }
}
