// Controller state
// (c) 2024 Ross Younger

use super::{DeltaTracker, DropCount, TargetLevel};

/// Everything the control loop remembers between iterations.
///
/// There is one of these per controller, and only the controller's own loop mutates it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerState {
    pub(super) tracker: DeltaTracker,
    /// The level most recently applied successfully (or the initial level)
    pub(super) current: TargetLevel,
    /// Set when the live qdisc may not match `current`, so the next decision must be applied
    pub(super) needs_apply: bool,
    pub(super) signal_failures: u32,
    pub(super) actuator_failures: u32,
    pub(super) total_signal_failures: u64,
    pub(super) total_actuator_failures: u64,
}

impl ControllerState {
    /// Initial state.
    ///
    /// If `sync_on_start` is set, the first decision is applied even if it matches
    /// the initial level.
    #[must_use]
    pub fn new(sync_on_start: bool) -> Self {
        Self {
            needs_apply: sync_on_start,
            ..Default::default()
        }
    }

    /// Initial state with a known previous drop count
    #[must_use]
    pub fn with_baseline(sync_on_start: bool, baseline: DropCount) -> Self {
        Self {
            tracker: DeltaTracker::with_baseline(baseline),
            ..Self::new(sync_on_start)
        }
    }

    /// The previous drop count, if we have one
    #[must_use]
    pub fn baseline(&self) -> Option<DropCount> {
        self.tracker.baseline()
    }

    /// The target level currently recorded as in force
    #[must_use]
    pub fn current_target(&self) -> TargetLevel {
        self.current
    }

    /// Whether the next decision will be applied regardless of whether it changed
    #[must_use]
    pub fn needs_apply(&self) -> bool {
        self.needs_apply
    }

    /// Consecutive failures to read the drop counter
    #[must_use]
    pub fn signal_failures(&self) -> u32 {
        self.signal_failures
    }

    /// Consecutive failures to apply a target
    #[must_use]
    pub fn actuator_failures(&self) -> u32 {
        self.actuator_failures
    }

    pub(super) fn record_signal_failure(&mut self) {
        self.signal_failures = self.signal_failures.saturating_add(1);
        self.total_signal_failures = self.total_signal_failures.saturating_add(1);
    }

    pub(super) fn record_signal_success(&mut self) {
        self.signal_failures = 0;
    }

    pub(super) fn record_applied(&mut self, level: TargetLevel) {
        self.current = level;
        self.needs_apply = false;
        self.actuator_failures = 0;
    }

    pub(super) fn record_actuator_failure(&mut self) {
        self.needs_apply = true;
        self.actuator_failures = self.actuator_failures.saturating_add(1);
        self.total_actuator_failures = self.total_actuator_failures.saturating_add(1);
    }

    /// Should `desired` be sent to the actuator?
    pub(super) fn should_apply(&self, desired: TargetLevel) -> bool {
        desired != self.current || self.needs_apply
    }
}

#[cfg(test)]
mod test {
    use super::ControllerState;
    use crate::controller::TargetLevel::{Congested, Normal};

    #[test]
    fn initial_state() {
        let s = ControllerState::new(false);
        assert_eq!(s.baseline(), None);
        assert_eq!(s.current_target(), Normal);
        assert!(!s.needs_apply());
        assert!(!s.should_apply(Normal));
        assert!(s.should_apply(Congested));

        let s = ControllerState::new(true);
        assert!(s.should_apply(Normal));
    }

    #[test]
    fn failure_forces_retry() {
        let mut s = ControllerState::new(false);
        s.record_actuator_failure();
        assert_eq!(s.current_target(), Normal);
        assert!(s.should_apply(Normal));
        assert_eq!(s.actuator_failures(), 1);
        s.record_applied(Congested);
        assert_eq!(s.current_target(), Congested);
        assert!(!s.should_apply(Congested));
        assert_eq!(s.actuator_failures(), 0);
        assert_eq!(s.total_actuator_failures, 1);
    }

    #[test]
    fn signal_failure_counters() {
        let mut s = ControllerState::with_baseline(false, 10);
        s.record_signal_failure();
        s.record_signal_failure();
        assert_eq!(s.signal_failures(), 2);
        s.record_signal_success();
        assert_eq!(s.signal_failures(), 0);
        assert_eq!(s.total_signal_failures, 2);
        assert_eq!(s.baseline(), Some(10));
    }
}
