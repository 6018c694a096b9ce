// acape control loop
// (c) 2024 Ross Younger

use std::{fmt::Display, future::Future, time::Duration};

use anyhow::Context as _;
use chrono::Utc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
    CongestionPolicy, ControllerState, Outcome, StatusRecord, TargetDurations, TargetLevel,
};
use crate::qdisc::{Actuator, SignalSource};
use crate::util::HumanDuration;

/// Runs a collaborator call under the configured time limit, folding a timeout into the error
async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    timeout(limit, fut)
        .await
        .with_context(|| format!("{what} timed out after {}", HumanDuration::new(limit)))?
}

/// Summary of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Iterations that ran to completion
    pub iterations: u64,
    /// Failed drop counter reads over the whole run
    pub signal_failures: u64,
    /// Failed actuations over the whole run
    pub actuator_failures: u64,
    /// The level recorded as in force at the end
    pub final_target: TargetLevel,
    /// Whether the run ended because it was cancelled (as opposed to reaching its iteration limit)
    pub cancelled: bool,
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} iterations, {} sample failures, {} actuation failures, final target {}",
            self.iterations, self.signal_failures, self.actuator_failures, self.final_target
        )
    }
}

/// The feedback controller for one interface.
///
/// Generic over where drop counts come from (`S`), how targets are applied (`A`) and
/// the decision policy (`P`), so that each can be replaced independently.
#[derive(Debug)]
pub struct Controller<S, A, P> {
    interface: String,
    source: S,
    actuator: A,
    policy: P,
    targets: TargetDurations,
    interval: Duration,
    call_timeout: Duration,
    iteration_limit: Option<u64>,
    state: ControllerState,
    iterations: u64,
}

impl<S, A, P> Controller<S, A, P>
where
    S: SignalSource,
    A: Actuator,
    P: CongestionPolicy,
{
    /// Constructor.
    ///
    /// Defaults: 1s interval, 3s call timeout, no iteration limit, initial
    /// [`ControllerState::new(true)`](ControllerState::new).
    #[must_use]
    pub fn new(
        interface: &str,
        source: S,
        actuator: A,
        policy: P,
        targets: TargetDurations,
    ) -> Self {
        Self {
            interface: interface.into(),
            source,
            actuator,
            policy,
            targets,
            interval: Duration::from_secs(1),
            call_timeout: Duration::from_secs(3),
            iteration_limit: None,
            state: ControllerState::new(true),
            iterations: 0,
        }
    }

    /// Sets the sampling interval
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the time limit on each collaborator call
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Stops [`run`](Self::run) after this many iterations
    #[must_use]
    pub fn with_iteration_limit(mut self, limit: Option<u64>) -> Self {
        self.iteration_limit = limit;
        self
    }

    /// Replaces the initial state
    #[must_use]
    pub fn with_state(mut self, state: ControllerState) -> Self {
        self.state = state;
        self
    }

    /// Read-only access to the state
    #[must_use]
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Read-only access to the signal source
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Read-only access to the actuator
    #[must_use]
    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Runs one iteration: sample, decide, apply if needed.
    ///
    /// Collaborator failures are absorbed into the returned record; this never fails.
    /// The iteration is counted only once it completes, so one abandoned part way
    /// through (by dropping the future) does not count.
    pub async fn step(&mut self) -> StatusRecord {
        let record = self.iterate(self.iterations + 1).await;
        self.iterations += 1;
        record
    }

    async fn iterate(&mut self, iteration: u64) -> StatusRecord {
        let timestamp = Utc::now();
        let interface = self.interface.as_str();

        let sample = with_timeout(
            self.call_timeout,
            "reading queue statistics",
            self.source.read_cumulative_drops(interface),
        )
        .await;
        let drops = match sample {
            Ok(d) => d,
            Err(e) => {
                self.state.record_signal_failure();
                warn!(
                    "failed to read drop counter for {interface} ({} consecutive): {e:#}",
                    self.state.signal_failures()
                );
                let target = self.state.current_target();
                return StatusRecord {
                    timestamp,
                    iteration,
                    drops: None,
                    observation: None,
                    target,
                    target_duration: self.targets.duration_for(target),
                    outcome: Outcome::SampleFailed(format!("{e:#}")),
                };
            }
        };
        self.state.record_signal_success();

        let observation = self.state.tracker.observe(drops);
        let delta = observation.delta();
        let desired = self.policy.decide(delta, self.state.current_target());
        let target_duration = self.targets.duration_for(desired);
        trace!("drops {drops} delta {delta} -> {desired}");

        let outcome = if self.state.should_apply(desired) {
            let previous = self.state.current_target();
            let result = with_timeout(
                self.call_timeout,
                "applying target",
                self.actuator.apply_target(interface, target_duration),
            )
            .await;
            match result {
                Ok(()) => {
                    if previous != desired {
                        info!(
                            "{interface}: {previous} -> {desired}, target now {}",
                            HumanDuration::new(target_duration)
                        );
                    } else {
                        debug!("{interface}: reapplied {desired} target");
                    }
                    self.state.record_applied(desired);
                    Outcome::Applied
                }
                Err(e) => {
                    self.state.record_actuator_failure();
                    warn!(
                        "failed to apply {desired} target to {interface} ({} consecutive): {e:#}",
                        self.state.actuator_failures()
                    );
                    Outcome::ApplyFailed(format!("{e:#}"))
                }
            }
        } else {
            Outcome::Unchanged
        };

        StatusRecord {
            timestamp,
            iteration,
            drops: Some(drops),
            observation: Some(observation),
            target: desired,
            target_duration,
            outcome,
        }
    }

    fn summary(&self, cancelled: bool) -> RunSummary {
        RunSummary {
            iterations: self.iterations,
            signal_failures: self.state.total_signal_failures,
            actuator_failures: self.state.total_actuator_failures,
            final_target: self.state.current_target(),
            cancelled,
        }
    }

    fn limit_reached(&self) -> bool {
        self.iteration_limit.is_some_and(|n| self.iterations >= n)
    }

    /// Runs iterations at a fixed rate until cancelled or the iteration limit is reached.
    ///
    /// Iterations start on interval boundaries; if one overruns, the boundaries it
    /// missed are skipped rather than bunched up. Cancellation is noticed while
    /// waiting for the next boundary and while an iteration is in flight (which is
    /// then abandoned).
    pub async fn run(&mut self, cancel: CancellationToken) -> RunSummary {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "controlling {} every {}: normal {}, congested {}",
            self.interface,
            HumanDuration::new(self.interval),
            HumanDuration::new(self.targets.normal),
            HumanDuration::new(self.targets.congested),
        );

        loop {
            if cancel.is_cancelled() || self.limit_reached() {
                break;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => (),
            }
            let record = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("abandoning iteration in progress");
                    break;
                },
                r = self.step() => r,
            };
            record.log();
        }

        let summary = self.summary(cancel.is_cancelled());
        info!("stopped controlling {}: {summary}", self.interface);
        summary
    }
}

#[cfg(test)]
mod test {
    use std::{collections::VecDeque, time::Duration};

    use anyhow::anyhow;
    use tokio_util::sync::CancellationToken;

    use super::Controller;
    use crate::controller::{
        ControllerState, Observation, Outcome, TargetDurations,
        TargetLevel::{self, Congested, Normal},
        ThresholdPolicy,
    };
    use crate::qdisc::{Actuator, SignalSource};

    const NORMAL: Duration = Duration::from_millis(5);
    const CONGESTED: Duration = Duration::from_millis(3);

    /// Replays a script of readings; `None` is a failure. Repeats the last entry when exhausted.
    #[derive(Debug)]
    struct ScriptedSource {
        script: VecDeque<Option<u64>>,
        last: Option<u64>,
        reads: usize,
        hang: bool,
    }

    impl ScriptedSource {
        fn new(script: &[Option<u64>]) -> Self {
            Self {
                script: script.iter().copied().collect(),
                last: None,
                reads: 0,
                hang: false,
            }
        }
        fn counts(counts: &[u64]) -> Self {
            Self::new(&counts.iter().copied().map(Some).collect::<Vec<_>>())
        }
    }

    impl SignalSource for ScriptedSource {
        async fn read_cumulative_drops(&mut self, _interface: &str) -> anyhow::Result<u64> {
            self.reads += 1;
            if self.hang {
                std::future::pending::<()>().await;
            }
            let next = match self.script.pop_front() {
                Some(n) => {
                    self.last = n;
                    n
                }
                None => self.last,
            };
            next.ok_or_else(|| anyhow!("statistics unavailable"))
        }
    }

    /// Records what it was asked to apply; fails while `failures` is non-zero.
    #[derive(Debug, Default)]
    struct RecordingActuator {
        calls: Vec<Duration>,
        failures: usize,
        hang: bool,
    }

    impl Actuator for RecordingActuator {
        async fn apply_target(
            &mut self,
            _interface: &str,
            target: Duration,
        ) -> anyhow::Result<()> {
            self.calls.push(target);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.failures > 0 {
                self.failures -= 1;
                anyhow::bail!("permission denied");
            }
            Ok(())
        }
    }

    type Uut = Controller<ScriptedSource, RecordingActuator, ThresholdPolicy>;

    fn controller(
        source: ScriptedSource,
        actuator: RecordingActuator,
        state: ControllerState,
    ) -> Uut {
        Controller::new(
            "eth0",
            source,
            actuator,
            ThresholdPolicy::default(),
            TargetDurations {
                normal: NORMAL,
                congested: CONGESTED,
            },
        )
        .with_state(state)
    }

    async fn run_steps(uut: &mut Uut, n: usize) -> Vec<(Option<u64>, TargetLevel, Outcome)> {
        let mut out = Vec::new();
        for _ in 0..n {
            let r = uut.step().await;
            out.push((r.delta(), r.target, r.outcome));
        }
        out
    }

    #[tokio::test]
    async fn scenario_with_start_sync() {
        let mut uut = controller(
            ScriptedSource::counts(&[5, 30, 32]),
            RecordingActuator::default(),
            ControllerState::with_baseline(true, 0),
        );
        let results = run_steps(&mut uut, 3).await;
        assert_eq!(
            results,
            vec![
                (Some(5), Normal, Outcome::Applied),
                (Some(25), Congested, Outcome::Applied),
                (Some(2), Normal, Outcome::Applied),
            ]
        );
        assert_eq!(uut.actuator().calls, vec![NORMAL, CONGESTED, NORMAL]);
    }

    #[tokio::test]
    async fn scenario_without_start_sync() {
        let mut uut = controller(
            ScriptedSource::counts(&[5, 30, 32]),
            RecordingActuator::default(),
            ControllerState::with_baseline(false, 0),
        );
        let results = run_steps(&mut uut, 3).await;
        assert_eq!(results[0], (Some(5), Normal, Outcome::Unchanged));
        assert_eq!(uut.actuator().calls, vec![CONGESTED, NORMAL]);
    }

    #[tokio::test]
    async fn scenario_counter_reset() {
        let mut uut = controller(
            ScriptedSource::counts(&[100, 40, 45]),
            RecordingActuator::default(),
            ControllerState::new(false),
        );
        let mut observations = Vec::new();
        for _ in 0..3 {
            let r = uut.step().await;
            assert_eq!(r.target, Normal);
            observations.push(r.observation.unwrap());
        }
        assert_eq!(
            observations,
            vec![
                Observation::Baseline,
                Observation::CounterReset {
                    previous: 100,
                    current: 40
                },
                Observation::Increase(5),
            ]
        );
        assert!(uut.actuator().calls.is_empty());
    }

    #[tokio::test]
    async fn no_redundant_reconfiguration() {
        let mut uut = controller(
            ScriptedSource::counts(&[0, 100, 200, 300, 400]),
            RecordingActuator::default(),
            ControllerState::new(false),
        );
        let results = run_steps(&mut uut, 5).await;
        let outcomes: Vec<_> = results.into_iter().map(|r| r.2).collect();
        assert_eq!(
            outcomes,
            vec![
                Outcome::Unchanged,
                Outcome::Applied,
                Outcome::Unchanged,
                Outcome::Unchanged,
                Outcome::Unchanged,
            ]
        );
        assert_eq!(uut.actuator().calls, vec![CONGESTED]);
        assert_eq!(uut.state().current_target(), Congested);
    }

    #[tokio::test]
    async fn failed_actuation_is_retried_with_same_decision() {
        let mut uut = controller(
            ScriptedSource::counts(&[0, 100, 200, 300]),
            RecordingActuator {
                failures: 1,
                ..Default::default()
            },
            ControllerState::new(false),
        );
        let results = run_steps(&mut uut, 4).await;
        assert_eq!(results[1].1, Congested);
        assert!(matches!(results[1].2, Outcome::ApplyFailed(_)));
        // recorded level stays put until the change sticks
        assert_eq!(results[2].2, Outcome::Applied);
        assert_eq!(results[3].2, Outcome::Unchanged);
        assert_eq!(uut.actuator().calls, vec![CONGESTED, CONGESTED]);
        assert_eq!(uut.state().actuator_failures(), 0);
    }

    #[tokio::test]
    async fn failed_actuation_reapplies_even_when_decision_reverts() {
        let mut uut = controller(
            ScriptedSource::counts(&[0, 100, 101]),
            RecordingActuator {
                failures: 1,
                ..Default::default()
            },
            ControllerState::new(false),
        );
        let _ = run_steps(&mut uut, 2).await;
        assert_eq!(uut.state().current_target(), Normal);
        assert!(uut.state().needs_apply());
        let r = uut.step().await;
        // Normal again, but the live state is unknown, so apply it
        assert_eq!(r.outcome, Outcome::Applied);
        assert_eq!(uut.actuator().calls, vec![CONGESTED, NORMAL]);
    }

    #[tokio::test]
    async fn sample_failure_preserves_state() {
        let mut uut = controller(
            ScriptedSource::new(&[Some(0), Some(50), None, None, Some(60)]),
            RecordingActuator::default(),
            ControllerState::new(false),
        );
        let _ = run_steps(&mut uut, 2).await;
        let before = *uut.state();
        assert_eq!(before.current_target(), Congested);
        assert_eq!(before.baseline(), Some(50));

        for n in 1..=2 {
            let r = uut.step().await;
            assert!(matches!(r.outcome, Outcome::SampleFailed(_)));
            assert_eq!(r.target, Congested);
            assert_eq!(r.delta(), None);
            assert_eq!(uut.state().baseline(), Some(50));
            assert_eq!(uut.state().current_target(), Congested);
            assert_eq!(uut.state().signal_failures(), n);
        }

        // recovery: delta measured against the last good reading
        let r = uut.step().await;
        assert_eq!(r.delta(), Some(10));
        assert_eq!(r.target, Normal);
        assert_eq!(r.outcome, Outcome::Applied);
        assert_eq!(uut.state().signal_failures(), 0);
        assert_eq!(uut.actuator().calls, vec![CONGESTED, NORMAL]);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_source_times_out() {
        let mut source = ScriptedSource::counts(&[0]);
        source.hang = true;
        let mut uut = controller(source, RecordingActuator::default(), ControllerState::new(true))
            .with_call_timeout(Duration::from_secs(2));
        let r = uut.step().await;
        let Outcome::SampleFailed(reason) = r.outcome else {
            panic!("unexpected outcome {:?}", r.outcome);
        };
        assert!(reason.contains("timed out after 2s"), "{reason}");
        assert!(uut.actuator().calls.is_empty());
        assert!(uut.state().needs_apply());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_actuator_times_out() {
        let mut uut = controller(
            ScriptedSource::counts(&[0]),
            RecordingActuator {
                hang: true,
                ..Default::default()
            },
            ControllerState::new(true),
        );
        let r = uut.step().await;
        assert!(matches!(r.outcome, Outcome::ApplyFailed(_)));
        assert_eq!(uut.state().actuator_failures(), 1);
        assert!(uut.state().needs_apply());
    }

    #[tokio::test(start_paused = true)]
    async fn run_honours_iteration_limit_at_fixed_rate() {
        let start = tokio::time::Instant::now();
        let mut uut = controller(
            ScriptedSource::counts(&[0, 5, 30, 32]),
            RecordingActuator::default(),
            ControllerState::new(true),
        )
        .with_interval(Duration::from_secs(1))
        .with_iteration_limit(Some(4));
        let summary = uut.run(CancellationToken::new()).await;
        assert_eq!(summary.iterations, 4);
        assert!(!summary.cancelled);
        assert_eq!(summary.final_target, Normal);
        assert_eq!(summary.actuator_failures, 0);
        // first tick is immediate, then one per second
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(uut.actuator().calls, vec![NORMAL, CONGESTED, NORMAL]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_cancelled_while_waiting() {
        let cancel = CancellationToken::new();
        let mut uut = controller(
            ScriptedSource::counts(&[0]),
            RecordingActuator::default(),
            ControllerState::new(true),
        )
        .with_interval(Duration::from_secs(10));
        let trigger = cancel.clone();
        let _jh = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });
        let summary = uut.run(cancel).await;
        assert!(summary.cancelled);
        // ticks at 0, 10, 20; cancelled at 25
        assert_eq!(summary.iterations, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_abandons_hung_iteration_when_cancelled() {
        let cancel = CancellationToken::new();
        let mut source = ScriptedSource::counts(&[0]);
        source.hang = true;
        let mut uut = controller(source, RecordingActuator::default(), ControllerState::new(true))
            .with_call_timeout(Duration::from_secs(3600));
        let trigger = cancel.clone();
        let _jh = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let start = tokio::time::Instant::now();
        let summary = uut.run(cancel).await;
        assert!(summary.cancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(uut.source().reads, 1);
        // the abandoned iteration did not complete, so is not counted
        assert_eq!(summary.iterations, 0);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut uut = controller(
            ScriptedSource::counts(&[0]),
            RecordingActuator::default(),
            ControllerState::new(true),
        );
        let summary = uut.run(cancel).await;
        assert_eq!(summary.iterations, 0);
        assert!(summary.cancelled);
        assert_eq!(uut.source().reads, 0);
    }
}
