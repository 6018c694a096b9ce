// acape top-level command-line arguments
// (c) 2024 Ross Younger

use std::path::PathBuf;

use clap::Parser;

use crate::config::Configuration_Optional;

/// Options that switch us into another mode i.e. which don't run the controller
pub(crate) const MODE_OPTIONS: &[&str] = &["show_config", "config_files"];

#[derive(Debug, Parser, Clone)]
#[command(
    author,
    version(env!("ACAPE_VERSION_STRING")),
    about,
    before_help = "e.g.   acape -i eth0 --threshold 40",
    infer_long_args(true)
)]
#[command(help_template(
    "\
{name} version {version}
{about-with-newline}
{usage-heading} {usage}
{before-help}
{all-args}{after-help}
"
))]
#[command(styles=super::styles::CLAP_STYLES)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct CliArgs {
    // MODE SELECTION ======================================================================
    /// Outputs the configuration, then exits.
    ///
    /// Each option is shown with its current value and where that value came from.
    #[arg(long, help_heading("Configuration"), display_order(0))]
    pub(crate) show_config: bool,

    /// Outputs the paths to configuration file(s), then exits
    #[arg(long, help_heading("Configuration"), display_order(0))]
    pub(crate) config_files: bool,

    /// Reads an additional configuration file.
    ///
    /// Values in this file override the system and user configuration files,
    /// but not environment variables or the command line.
    #[arg(short = 'c', long, value_name("FILE"), help_heading("Configuration"))]
    pub(crate) config: Option<PathBuf>,

    // BEHAVIOUR ===========================================================================
    /// Decides targets and logs them, but never reconfigures the queueing discipline.
    ///
    /// Statistics are still read from the system.
    #[arg(short = 'n', long, action, conflicts_with_all(MODE_OPTIONS))]
    pub(crate) dry_run: bool,

    /// Quiet mode
    ///
    /// Reports only warnings and errors; per-iteration status lines are suppressed
    #[arg(short, long, action, conflicts_with("debug"))]
    pub(crate) quiet: bool,

    // DEBUG ===============================================================================
    /// Enable detailed debug output
    ///
    /// This has the same effect as setting `RUST_LOG=acape=trace` in the environment.
    /// If present, `RUST_LOG` overrides this option.
    #[arg(short, long, action, help_heading("Debug"))]
    pub(crate) debug: bool,

    /// Log to a file
    ///
    /// By default the log receives everything printed to stderr.
    /// To override this behaviour, set the environment variable `RUST_LOG_FILE_DETAIL` (same semantics as `RUST_LOG`).
    #[arg(short('l'), long, action, help_heading("Debug"), value_name("FILE"))]
    pub(crate) log_file: Option<String>,

    // CONFIGURABLE OPTIONS ================================================================
    #[command(flatten)]
    pub(crate) config_opts: Configuration_Optional,
}

impl CliArgs {
    /// The tracing level implied by `--debug` and `--quiet`
    pub(crate) fn trace_level(&self) -> &'static str {
        if self.debug {
            "trace"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod test {
    use clap::Parser as _;

    use super::CliArgs;

    #[test]
    fn controller_options() {
        let args = CliArgs::try_parse_from([
            "acape",
            "-i",
            "eth0",
            "--threshold",
            "40",
            "--interval",
            "500ms",
            "--sync-on-start",
            "false",
            "-n",
        ])
        .unwrap();
        assert!(args.dry_run);
        assert_eq!(args.config_opts.interface.as_deref(), Some("eth0"));
        assert_eq!(args.config_opts.threshold, Some(40));
        assert_eq!(
            args.config_opts.interval.map(|d| *d),
            Some(std::time::Duration::from_millis(500))
        );
        assert_eq!(args.config_opts.sync_on_start, Some(false));
        assert_eq!(args.config_opts.normal_target, None);
        assert_eq!(args.trace_level(), "info");
    }

    #[test]
    fn levels() {
        let args = CliArgs::try_parse_from(["acape", "-q"]).unwrap();
        assert_eq!(args.trace_level(), "warn");
        let args = CliArgs::try_parse_from(["acape", "-d"]).unwrap();
        assert_eq!(args.trace_level(), "trace");
        assert!(CliArgs::try_parse_from(["acape", "-d", "-q"]).is_err());
    }

    #[test]
    fn dry_run_conflicts_with_modes() {
        assert!(CliArgs::try_parse_from(["acape", "-n", "--show-config"]).is_err());
    }

    #[test]
    fn bad_values_rejected() {
        assert!(CliArgs::try_parse_from(["acape", "--threshold", "lots"]).is_err());
        assert!(CliArgs::try_parse_from(["acape", "--privilege", "maybe"]).is_err());
        assert!(CliArgs::try_parse_from(["acape", "--normal-target", "soon"]).is_err());
    }

    #[test]
    fn no_arguments_is_fine() {
        let args = CliArgs::try_parse_from(["acape"]).unwrap();
        assert!(!args.show_config);
        assert!(args.config.is_none());
        assert!(args.config_opts.interface.is_none());
    }
}
