// Congestion policy
// (c) 2024 Ross Younger

use super::{DropDelta, TargetLevel};

/// Drops per interval above which we consider the interface congested
pub const DEFAULT_DROP_THRESHOLD: u64 = 20;

/// Maps an observed drop delta to the target level we want.
///
/// Implementations must be pure: no I/O, no interior mutability. The controller
/// may call `decide` any number of times with the same inputs.
pub trait CongestionPolicy {
    /// Decides the desired target level, given the latest delta and the level currently in force.
    fn decide(&self, delta: DropDelta, current: TargetLevel) -> TargetLevel;
}

/// A single hard threshold: more than `threshold` drops in an interval means congestion.
///
/// There is no hysteresis; the level follows each interval's delta directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    threshold: u64,
}

impl ThresholdPolicy {
    /// Constructor
    #[must_use]
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    /// Accessor
    #[must_use]
    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DROP_THRESHOLD)
    }
}

impl CongestionPolicy for ThresholdPolicy {
    fn decide(&self, delta: DropDelta, _current: TargetLevel) -> TargetLevel {
        if delta > self.threshold {
            TargetLevel::Congested
        } else {
            TargetLevel::Normal
        }
    }
}

#[cfg(test)]
mod test {
    use super::{CongestionPolicy as _, ThresholdPolicy};
    use crate::controller::TargetLevel::{self, Congested, Normal};

    #[test]
    fn exhaustive_around_default() {
        let uut = ThresholdPolicy::default();
        for current in [Normal, Congested] {
            for delta in 0..=20 {
                assert_eq!(uut.decide(delta, current), Normal, "delta {delta}");
            }
            for delta in 21..=1000 {
                assert_eq!(uut.decide(delta, current), Congested, "delta {delta}");
            }
            assert_eq!(uut.decide(u64::MAX, current), Congested);
        }
    }

    #[test]
    fn boundary() {
        let uut = ThresholdPolicy::default();
        assert_eq!(uut.decide(20, TargetLevel::Congested), Normal);
        assert_eq!(uut.decide(21, TargetLevel::Normal), Congested);
    }

    #[test]
    fn custom_threshold() {
        let uut = ThresholdPolicy::new(0);
        assert_eq!(uut.threshold(), 0);
        assert_eq!(uut.decide(0, Normal), Normal);
        assert_eq!(uut.decide(1, Normal), Congested);
    }
}
