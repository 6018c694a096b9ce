//! Queueing discipline collaborators: where drop counts come from, and where targets go
// (c) 2024 Ross Younger

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::controller::DropCount;
use crate::os::{AbstractPlatform as _, Platform};

mod dry_run;
pub use dry_run::DryRunActuator;

mod tc;
pub use tc::{parse_root_drops, TcActuator, TcStatistics};

/// Something that can report the cumulative drop counter of an interface's queueing discipline.
///
/// The counter is expected to be monotonically non-decreasing, except when the queueing
/// discipline is recreated, in which case it starts again from zero.
pub trait SignalSource {
    /// Reads the current cumulative drop count for the named interface.
    fn read_cumulative_drops(
        &mut self,
        interface: &str,
    ) -> impl Future<Output = anyhow::Result<DropCount>>;
}

/// Something that can set the latency target of an interface's queueing discipline.
pub trait Actuator {
    /// Applies `target` as the latency target of the named interface's queueing discipline.
    fn apply_target(
        &mut self,
        interface: &str,
        target: Duration,
    ) -> impl Future<Output = anyhow::Result<()>>;
}

/// How to obtain the privileges needed to reconfigure a queueing discipline
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    clap::ValueEnum,
    strum::Display,
    strum::EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// Use `sudo` unless already running as root
    #[default]
    Auto,
    /// Always use `sudo`
    Sudo,
    /// Never use `sudo`
    Direct,
}

impl Privilege {
    /// Whether reconfiguration commands should be run under `sudo`
    #[must_use]
    pub fn use_sudo(self) -> bool {
        match self {
            Privilege::Auto => !Platform::is_privileged(),
            Privilege::Sudo => true,
            Privilege::Direct => false,
        }
    }
}
