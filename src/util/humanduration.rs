//! Serialization helper type - Duration parseable by humanize_rs
// (c) 2024 Ross Younger

use std::{fmt::Display, marker::PhantomData, ops::Deref, str::FromStr, time::Duration};

use anyhow::Context as _;
use serde::Serialize;

use super::cli::IntOrString;

/// A duration that may be expressed with a unit suffix (`5ms`, `1s`, `1m`) or as a bare
/// integer number of milliseconds.
///
/// When displayed, the value is rendered in the syntax understood by `tc(8)`, using
/// the coarsest unit that represents it exactly: `1s`, `5ms`, `500us`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    /// standard constructor
    #[must_use]
    pub fn new(value: Duration) -> Self {
        Self(value)
    }

    /// Convenience constructor
    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    /// Is this a zero-length duration?
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Deref for HumanDuration {
    type Target = Duration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<HumanDuration> for Duration {
    fn from(value: HumanDuration) -> Self {
        value.0
    }
}

impl From<Duration> for HumanDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

/// Bare integers are milliseconds
impl From<u64> for HumanDuration {
    fn from(value: u64) -> Self {
        Self::from_millis(value)
    }
}

impl From<HumanDuration> for String {
    fn from(value: HumanDuration) -> Self {
        value.to_string()
    }
}

impl Display for HumanDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = self.0;
        if d.subsec_nanos() == 0 {
            write!(f, "{}s", d.as_secs())
        } else if d.subsec_nanos() % 1_000_000 == 0 {
            write!(f, "{}ms", d.as_millis())
        } else {
            write!(f, "{}us", d.as_micros())
        }
    }
}

impl FromStr for HumanDuration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(ms) = s.parse::<u64>() {
            return Ok(Self::from_millis(ms));
        }
        Ok(Self::new(
            humanize_rs::duration::parse(s)
                .with_context(|| format!("parsing duration string `{s}`"))?,
        ))
    }
}

impl<'de> serde::Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(IntOrString(PhantomData))
    }
}
