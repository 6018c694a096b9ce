//! The control loop: sample drops, compute the delta, decide a target, apply it
// (c) 2024 Ross Younger

use std::time::Duration;

/// Cumulative drop counter of a queueing discipline, as read from the system
pub type DropCount = u64;

/// Increase in [`DropCount`] over one sampling interval
pub type DropDelta = u64;

mod delta;
pub use delta::{compute_delta, DeltaTracker, Observation};

mod policy;
pub use policy::{CongestionPolicy, ThresholdPolicy, DEFAULT_DROP_THRESHOLD};

mod state;
pub use state::ControllerState;

mod status;
pub use status::{Outcome, StatusRecord};

mod main_loop;
pub use main_loop::{Controller, RunSummary};

/// The latency target the controller wants, as a level rather than a duration.
///
/// Levels are ordered from most relaxed to tightest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TargetLevel {
    /// No congestion seen
    #[default]
    Normal,
    /// Drops exceeded the threshold in the last interval
    Congested,
}

/// The concrete durations that each [`TargetLevel`] maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDurations {
    /// Target while [`TargetLevel::Normal`]
    pub normal: Duration,
    /// Target while [`TargetLevel::Congested`]
    pub congested: Duration,
}

impl TargetDurations {
    /// Looks up the duration for a level
    #[must_use]
    pub fn duration_for(&self, level: TargetLevel) -> Duration {
        match level {
            TargetLevel::Normal => self.normal,
            TargetLevel::Congested => self.congested,
        }
    }
}

impl Default for TargetDurations {
    fn default() -> Self {
        Self {
            normal: Duration::from_millis(5),
            congested: Duration::from_millis(3),
        }
    }
}
