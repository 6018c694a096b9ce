//! Configuration structure
// (c) 2024 Ross Younger

use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use serde::{Deserialize, Serialize};
use struct_field_names_as_array::FieldNamesAsSlice;

use crate::{
    controller::TargetDurations,
    qdisc::Privilege,
    util::{derive_deftly_template_Optionalify, HumanDuration, TimeFormat},
};

use derive_deftly::Deftly;

/// Linux limits interface names to `IFNAMSIZ` (16) bytes, including the terminating NUL.
const MAX_INTERFACE_NAME: usize = 15;

/// The set of configurable options supported by acape.
///
/// **Note:** The implementation of `default()` for this struct returns acape's hard-wired configuration defaults.
///
/// This structure uses the [Optionalify](crate::util::derive_deftly_template_Optionalify) deftly macro to automatically
/// define the `Configuration_Optional` struct, which is the same but has all members of type `Option<whatever>`.
/// This is the magic that lets us use the same underlying struct for CLI and saved configuration files:
/// the CLI uses the `_Optional` version , with everything defaulting to `None`.
/// The result is that wherever the user does not provide a value, values read from lower priority sources
/// (environment, configuration files and system defaults) obtain.
///
// Maintainer note: None of the members of this struct should be Option<anything>. That leads to sunspots in the CLI and strange warts (Some(Some(foo))).
#[derive(Deftly)]
#[derive_deftly(Optionalify)]
#[deftly(visibility = "pub(crate)")]
#[derive(Debug, Clone, PartialEq, Eq, Parser, Deserialize, Serialize, FieldNamesAsSlice)]
pub struct Configuration {
    // WHAT TO CONTROL =================================================================================
    /// The network interface whose root queueing discipline we watch and tune.
    /// [default: wlp4s0]
    #[arg(short, long, value_name("IFACE"), help_heading("Control"), display_order(1))]
    pub interface: String,

    /// How often to sample the drop counter.
    /// [default: 1s]
    ///
    /// This may be given with a unit (`500ms`, `2s`) or as a plain number of milliseconds.
    #[arg(long, value_name("DURATION"), help_heading("Control"), display_order(2), value_parser=clap::value_parser!(HumanDuration))]
    pub interval: HumanDuration,

    /// Congestion is declared when more than this many packets are dropped in one interval.
    /// [default: 20]
    #[arg(long, value_name("DROPS"), help_heading("Control"), display_order(3))]
    pub threshold: u64,

    /// The latency target to apply while the interface is not congested.
    /// [default: 5ms]
    #[arg(long, value_name("DURATION"), help_heading("Targets"), value_parser=clap::value_parser!(HumanDuration))]
    pub normal_target: HumanDuration,

    /// The latency target to apply while the interface is congested.
    /// [default: 3ms]
    ///
    /// This is usually tighter than the normal target, so the queue starts dropping earlier.
    #[arg(long, value_name("DURATION"), help_heading("Targets"), value_parser=clap::value_parser!(HumanDuration))]
    pub congested_target: HumanDuration,

    /// Applies the decided target on the first iteration even if it is unchanged.
    /// [default: true]
    ///
    /// The live state of the queueing discipline is unknown at startup; this brings it into line.
    #[arg(long, value_name("BOOL"), help_heading("Targets"), action = clap::ArgAction::Set)]
    pub sync_on_start: bool,

    // HOW TO TALK TO THE SYSTEM =======================================================================
    /// Time limit for each call out to the queue statistics or reconfiguration command.
    /// [default: 3s]
    ///
    /// A call that runs past the sampling interval causes the missed interval boundaries to be skipped.
    #[arg(short, long, value_name("DURATION"), help_heading("System"), value_parser=clap::value_parser!(HumanDuration))]
    pub timeout: HumanDuration,

    /// The kind of root queueing discipline to reconfigure.
    /// [default: `fq_codel`]
    #[arg(long, value_name("KIND"), help_heading("System"))]
    pub qdisc: String,

    /// The traffic control program to run.
    /// [default: tc]
    #[arg(long, value_name("PROGRAM"), help_heading("System"))]
    pub tc: String,

    /// How to obtain the privileges needed to reconfigure the queueing discipline.
    /// [default: auto]
    #[arg(long, value_name("MODE"), help_heading("System"))]
    #[clap(value_enum)]
    pub privilege: Privilege,

    // RUN CONTROL =====================================================================================
    /// Stops after this many iterations. 0 means run until interrupted.
    /// [default: 0]
    #[arg(long, value_name("N"), help_heading("Output"))]
    pub iterations: u64,

    /// Specifies the time format to use when printing messages to the console or to file
    /// [default: local]
    #[arg(short = 'T', long, value_name("FORMAT"), help_heading("Output"))]
    #[clap(value_enum)]
    pub time_format: TimeFormat,
}

impl Configuration {
    /// Sampling interval accessor
    #[must_use]
    pub fn interval(&self) -> Duration {
        *self.interval
    }

    /// Collaborator call timeout accessor
    #[must_use]
    pub fn timeout(&self) -> Duration {
        *self.timeout
    }

    /// The concrete durations that the target levels map to
    #[must_use]
    pub fn targets(&self) -> TargetDurations {
        TargetDurations {
            normal: *self.normal_target,
            congested: *self.congested_target,
        }
    }

    /// Iteration limit, if there is one
    #[must_use]
    pub fn iteration_limit(&self) -> Option<u64> {
        match self.iterations {
            0 => None,
            n => Some(n),
        }
    }

    /// Checks that this configuration is usable.
    ///
    /// Errors here are fatal: the controller must not start with a configuration that fails validation.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interface.is_empty() {
            bail!("interface name must not be empty");
        }
        if self.interface.len() > MAX_INTERFACE_NAME {
            bail!(
                "interface name `{}` is too long (maximum {MAX_INTERFACE_NAME} bytes)",
                self.interface
            );
        }
        if self
            .interface
            .chars()
            .any(|c| c.is_whitespace() || c == '/')
        {
            bail!("interface name `{}` contains invalid characters", self.interface);
        }
        if self.interval.is_zero() {
            bail!("interval must be greater than zero");
        }
        if self.timeout.is_zero() {
            bail!("timeout must be greater than zero");
        }
        if self.normal_target.is_zero() || self.congested_target.is_zero() {
            bail!("target durations must be greater than zero");
        }
        if self.qdisc.trim().is_empty() {
            bail!("qdisc kind must not be empty");
        }
        if self.tc.trim().is_empty() {
            bail!("tc program must not be empty");
        }
        Ok(())
    }

    /// Reports settings which are usable but probably not what the user wanted.
    ///
    /// These are logged at startup, once tracing is set up.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.congested_target >= self.normal_target {
            out.push(format!(
                "congested target {} is not tighter than normal target {}",
                self.congested_target, self.normal_target
            ));
        }
        out
    }

    /// Formats the control-related options for display
    #[must_use]
    pub fn format_control_config(&self) -> String {
        use human_repr::HumanDuration as _;
        format!(
            "interface {iface}, interval {interval}, threshold {threshold} drops, targets {normal} normal / {congested} congested, qdisc {qdisc}",
            iface = self.interface,
            interval = self.interval().human_duration(),
            threshold = self.threshold,
            normal = self.normal_target,
            congested = self.congested_target,
            qdisc = self.qdisc,
        )
    }
}

impl Default for Configuration {
    /// **(Unusual!)**
    /// Returns acape's hard-wired configuration defaults.
    fn default() -> Self {
        Self {
            // Control
            interface: "wlp4s0".into(),
            interval: HumanDuration::from_millis(1000),
            threshold: 20,
            normal_target: HumanDuration::from_millis(5),
            congested_target: HumanDuration::from_millis(3),
            sync_on_start: true,

            // System
            timeout: HumanDuration::from_millis(3000),
            qdisc: "fq_codel".into(),
            tc: "tc".into(),
            privilege: Privilege::Auto,

            // Output
            iterations: 0,
            time_format: TimeFormat::Local,
        }
    }
}
