//! Tracing helpers
// (c) 2024 Ross Younger

use std::{fs::File, sync::Arc};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt::{
        self,
        time::{ChronoLocal, ChronoUtc},
        MakeWriter,
    },
    prelude::*,
    EnvFilter, Layer, Registry,
};

const STANDARD_ENV_VAR: &str = "RUST_LOG";
const LOG_FILE_DETAIL_ENV_VAR: &str = "RUST_LOG_FILE_DETAIL";

const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const UTC_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

/// Selects the format of timestamps in log output
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
pub enum TimeFormat {
    /// Local time, to the millisecond
    #[default]
    Local,
    /// UTC, to the millisecond
    Utc,
    /// RFC 3339 in the local timezone
    Rfc3339,
}

/// Result type for `filter_for()`
struct FilterResult {
    filter: EnvFilter,
    used_env: bool, // Did we use the environment variable we were requested to?
}

/// Log filter setup:
/// Use a given environment variable; if it wasn't present, log only acape items at a given trace level.
fn filter_for(trace_level: &str, key: &str) -> anyhow::Result<FilterResult> {
    EnvFilter::try_from_env(key)
        .map(|filter| FilterResult {
            filter,
            used_env: true,
        })
        .or_else(|e| {
            // The env var was unset or invalid. Which is it?
            if std::env::var(key).is_ok() {
                anyhow::bail!("{key} (set in environment) was invalid: {e}");
            }
            // It was unset. Fall back.
            Ok(FilterResult {
                filter: EnvFilter::new(format!("acape={trace_level}")),
                used_env: false,
            })
        })
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn make_layer<W>(writer: W, filter: FilterResult, time_format: TimeFormat, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    // If we used the environment variable, show log targets; if we did not, we're only logging acape, so do not show targets.
    let format = fmt::layer()
        .compact()
        .with_target(filter.used_env)
        .with_ansi(ansi)
        .with_writer(writer);
    match time_format {
        TimeFormat::Local => format
            .with_timer(ChronoLocal::new(LOCAL_TIME_FORMAT.into()))
            .with_filter(filter.filter)
            .boxed(),
        TimeFormat::Utc => format
            .with_timer(ChronoUtc::new(UTC_TIME_FORMAT.into()))
            .with_filter(filter.filter)
            .boxed(),
        TimeFormat::Rfc3339 => format
            .with_timer(ChronoLocal::rfc_3339())
            .with_filter(filter.filter)
            .boxed(),
    }
}

/// Set up rust tracing, to console and optionally to file.
///
/// By default we log only our events (acape), at a given trace level.
/// This can be overridden by setting `RUST_LOG`.
///
/// For examples, see <https://docs.rs/tracing-subscriber/0.3.18/tracing_subscriber/fmt/index.html#filtering-events-with-environment-variables>
///
/// **CAUTION:** If this function fails, tracing won't be set up; callers must take extra care to report the error.
pub fn setup(
    trace_level: &str,
    filename: Option<&str>,
    time_format: TimeFormat,
) -> anyhow::Result<()> {
    let mut layers = Vec::new();

    /////// Console output

    let filter = filter_for(trace_level, STANDARD_ENV_VAR)?;
    layers.push(make_layer(std::io::stderr, filter, time_format, true));

    //////// File output

    if let Some(filename) = filename {
        let out_file = Arc::new(File::create(filename).context("Failed to open log file")?);
        let filter = if std::env::var(LOG_FILE_DETAIL_ENV_VAR).is_ok() {
            FilterResult {
                filter: EnvFilter::try_from_env(LOG_FILE_DETAIL_ENV_VAR)?,
                used_env: true,
            }
        } else {
            filter_for(trace_level, STANDARD_ENV_VAR)?
        };
        layers.push(make_layer(out_file, filter, time_format, false));
    }

    ////////

    tracing_subscriber::registry().with(layers).init();

    Ok(())
}

#[cfg(test)]
pub(crate) fn setup_tracing_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod test {
    use std::str::FromStr as _;

    use super::TimeFormat;

    #[test]
    fn time_format_names() {
        assert_eq!(TimeFormat::from_str("utc").unwrap(), TimeFormat::Utc);
        assert_eq!(TimeFormat::from_str("RFC3339").unwrap(), TimeFormat::Rfc3339);
        assert_eq!(TimeFormat::Local.to_string(), "local");
        let _ = TimeFormat::from_str("martian").unwrap_err();
    }
}
