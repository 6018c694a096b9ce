// (c) 2024 Ross Younger
//! # Configuration management
//!
//! acape obtains run-time configuration from the following sources, in order:
//! 1. Command-line options
//! 2. Environment variables named `ACAPE_<FIELD>`, e.g. `ACAPE_INTERFACE=eth0`
//! 3. A configuration file named with `--config`, if given
//! 4. The user's configuration file (typically `~/.acape.toml`)
//! 5. The system-wide configuration file (typically `/etc/acape.toml`)
//! 6. Hard-wired defaults
//!
//! Each option may appear in multiple places, but only the first match is used.
//!
//! **Note** Configuration file locations are platform-dependent.
//! To see what applies on the current platform, run `acape --config-files`.
//!
//! ## File format
//!
//! Configuration files are TOML. Field names are the same as the long command-line
//! options, with `_` in place of `-`.
//!
//! Durations may be written with a unit (`"500ms"`, `"2s"`) or as a bare integer
//! number of milliseconds.
//!
//! ### Example
//!
//! ```text
//! # Wired uplink that sees bursty backup traffic overnight
//! interface = "enp3s0"
//! interval = "500ms"
//! threshold = 40
//! normal_target = "5ms"
//! congested_target = "2ms"
//! ```
//!
//! ## Configurable options
//!
//! The full list of supported fields is defined by [Configuration].
//!
//! On the command line:
//! * `acape --show-config` outputs a list of supported fields, their current values, and where each value came from.
//! * For an explanation of each field, refer to `acape --help` .
//! * `acape --config-files` outputs the list of configuration files for the current user and platform.
//!

mod structure;
pub use structure::Configuration;
pub(crate) use structure::Configuration_Optional;

mod manager;
pub use manager::{DisplayAdapter, Manager};

pub(crate) const BASE_CONFIG_FILENAME: &str = "acape.toml";
