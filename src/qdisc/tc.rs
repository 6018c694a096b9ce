// Queue statistics and reconfiguration via tc(8)
// (c) 2024 Ross Younger

use std::{process::Output, time::Duration};

use anyhow::{anyhow, bail, Context as _};
use tokio::process::Command;
use tracing::{debug, trace, warn};

use super::{Actuator, SignalSource};
use crate::controller::DropCount;
use crate::util::HumanDuration;

fn check_status(output: &Output, what: &str) -> anyhow::Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    bail!("{what} failed ({}): {}", output.status, stderr.trim())
}

/// Extracts the drop counter of the first (root) queueing discipline from the output of
/// `tc -s qdisc show dev <iface>`.
///
/// The relevant line looks like this:
/// ```text
///  Sent 1234567 bytes 8910 pkt (dropped 42, overlimits 0 requeues 3)
/// ```
pub fn parse_root_drops(text: &str) -> anyhow::Result<DropCount> {
    let mut tokens = text.split_whitespace();
    while let Some(token) = tokens.next() {
        if token.trim_start_matches('(') != "dropped" {
            continue;
        }
        let value = tokens
            .next()
            .ok_or_else(|| anyhow!("tc output ended after `dropped`"))?;
        let value = value.trim_end_matches(&[',', ')'][..]);
        return value
            .parse()
            .with_context(|| format!("malformed drop counter `{value}` in tc output"));
    }
    bail!("no drop counter found in tc output")
}

/// The kind of the first queueing discipline listed (`fq_codel`, `mq`, ...)
fn root_qdisc_kind(text: &str) -> Option<&str> {
    let mut tokens = text.split_whitespace();
    let _ = tokens.find(|t| *t == "qdisc")?;
    tokens.next()
}

/// Reads queue statistics by running `tc -s qdisc show dev <iface>`
#[derive(Debug, Clone)]
pub struct TcStatistics {
    program: String,
    expected_kind: Option<String>,
    warned_kind: bool,
}

impl TcStatistics {
    /// Constructor.
    ///
    /// If `expected_kind` is given, a warning is logged (once) if the interface's root
    /// queueing discipline turns out to be of a different kind.
    #[must_use]
    pub fn new(program: &str, expected_kind: Option<&str>) -> Self {
        Self {
            program: program.into(),
            expected_kind: expected_kind.map(String::from),
            warned_kind: false,
        }
    }

    fn check_kind(&mut self, text: &str, interface: &str) {
        let (Some(expected), Some(found)) = (self.expected_kind.as_deref(), root_qdisc_kind(text))
        else {
            return;
        };
        if expected != found && !self.warned_kind {
            warn!("root qdisc on {interface} is {found}, not {expected}; target changes will probably fail");
            self.warned_kind = true;
        }
    }
}

impl SignalSource for TcStatistics {
    async fn read_cumulative_drops(&mut self, interface: &str) -> anyhow::Result<DropCount> {
        let output = Command::new(&self.program)
            .args(["-s", "qdisc", "show", "dev", interface])
            .env("LC_ALL", "C")
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;
        check_status(&output, "tc qdisc show")?;
        let text = std::str::from_utf8(&output.stdout).context("tc output was not UTF-8")?;
        trace!("tc output: {text}");
        self.check_kind(text, interface);
        parse_root_drops(text)
    }
}

/// Sets the latency target by running `tc qdisc change dev <iface> root <qdisc> target <t>`,
/// under `sudo` if so configured.
#[derive(Debug, Clone)]
pub struct TcActuator {
    program: String,
    qdisc: String,
    sudo: bool,
}

impl TcActuator {
    /// Constructor
    #[must_use]
    pub fn new(program: &str, qdisc: &str, sudo: bool) -> Self {
        Self {
            program: program.into(),
            qdisc: qdisc.into(),
            sudo,
        }
    }

    /// The full command line that would be run to apply the given target
    #[must_use]
    pub fn command_line(&self, interface: &str, target: Duration) -> Vec<String> {
        let mut argv = Vec::new();
        if self.sudo {
            // -n: fail rather than prompt for a password
            argv.extend(["sudo".to_string(), "-n".to_string()]);
        }
        argv.push(self.program.clone());
        argv.extend(
            ["qdisc", "change", "dev", interface, "root", self.qdisc.as_str(), "target"]
                .map(String::from),
        );
        argv.push(HumanDuration::new(target).to_string());
        argv
    }
}

impl Actuator for TcActuator {
    async fn apply_target(&mut self, interface: &str, target: Duration) -> anyhow::Result<()> {
        let argv = self.command_line(interface, target);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command line"))?;
        debug!("running {}", argv.join(" "));
        let output = Command::new(program)
            .args(args)
            .env("LC_ALL", "C")
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {program}"))?;
        check_status(&output, "tc qdisc change")
    }
}
