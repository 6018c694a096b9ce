// Per-iteration status records
// (c) 2024 Ross Younger

use std::{fmt::Display, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};

use super::{DropCount, DropDelta, Observation, TargetLevel};
use crate::util::HumanDuration;

/// What happened to the actuator in one iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The drop counter could not be read; nothing was decided
    SampleFailed(String),
    /// The decision matched the level in force; the actuator was not called
    Unchanged,
    /// The actuator applied the decided target
    Applied,
    /// The actuator failed; it will be retried on the next iteration
    ApplyFailed(String),
}

impl Outcome {
    /// Short name, for log fields
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::SampleFailed(_) => "sample_failed",
            Outcome::Unchanged => "unchanged",
            Outcome::Applied => "applied",
            Outcome::ApplyFailed(_) => "apply_failed",
        }
    }

    /// Did anything fail in this iteration?
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::SampleFailed(_) | Outcome::ApplyFailed(_))
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::SampleFailed(reason) | Outcome::ApplyFailed(reason) => {
                write!(f, "{}: {reason}", self.name())
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// The record emitted for every iteration of the control loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    /// When the iteration started
    pub timestamp: DateTime<Utc>,
    /// Iteration number, starting from 1
    pub iteration: u64,
    /// The counter reading, if it could be read
    pub drops: Option<DropCount>,
    /// What the reading meant, if it could be read
    pub observation: Option<Observation>,
    /// The level decided (or retained, if nothing was decided)
    pub target: TargetLevel,
    /// The duration corresponding to `target`
    pub target_duration: Duration,
    /// What the actuator did
    pub outcome: Outcome,
}

impl StatusRecord {
    /// The drop delta, if a reading was taken
    #[must_use]
    pub fn delta(&self) -> Option<DropDelta> {
        self.observation.map(|o| o.delta())
    }

    /// Emits this record as a structured log line
    pub fn log(&self) {
        let delta = self.delta();
        let reset = self.observation.is_some_and(|o| o.is_reset());
        let target = HumanDuration::new(self.target_duration);
        if self.outcome.is_failure() {
            tracing::warn!(
                iteration = self.iteration,
                drops = self.drops,
                delta,
                reset,
                level = %self.target,
                target = %target,
                outcome = self.outcome.name(),
                "{self}"
            );
        } else {
            tracing::info!(
                iteration = self.iteration,
                drops = self.drops,
                delta,
                reset,
                level = %self.target,
                target = %target,
                outcome = self.outcome.name(),
                "{self}"
            );
        }
    }
}

impl Display for StatusRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ts = self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        let delta = self
            .delta()
            .map_or_else(|| "-".to_string(), |d| d.to_string());
        write!(
            f,
            "{ts} #{} delta {delta} -> {} ({}) {}",
            self.iteration,
            self.target,
            HumanDuration::new(self.target_duration),
            self.outcome
        )
    }
}
