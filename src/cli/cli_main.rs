// Main CLI entrypoint
// (c) 2024 Ross Younger

use std::process::ExitCode;

use anstream::{eprintln, println};
use clap::Parser;
use tokio::{
    signal::unix::{signal, Signal, SignalKind},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    args::CliArgs,
    styles::{ERROR, INFO},
};
use crate::{
    config::{Configuration, Manager},
    controller::{Controller, ControllerState, RunSummary, ThresholdPolicy},
    qdisc::{Actuator, DryRunActuator, TcActuator, TcStatistics},
    util::setup_tracing,
};

/// Main CLI entrypoint
pub fn cli() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse();

    if args.config_files {
        println!("{:?}", Manager::config_files());
        return Ok(ExitCode::SUCCESS);
    }

    let mut manager = Manager::new();
    if let Some(path) = &args.config {
        manager.merge_toml_file(path);
    }
    manager.merge_environment();
    manager.merge_provider(args.config_opts.clone());

    if args.show_config {
        println!("{}", manager.to_display_adapter::<Configuration>(true));
        return Ok(ExitCode::SUCCESS);
    }

    let config = match manager.get::<Configuration>() {
        Ok(c) => c,
        Err(e) => return Ok(config_error(&anyhow::Error::from(e))),
    };

    setup_tracing(
        args.trace_level(),
        args.log_file.as_deref(),
        config.time_format,
    )
    .inspect_err(|e| eprintln!("{e:?}"))?;

    if let Err(e) = config.validate() {
        return Ok(config_error(&e));
    }
    let _ = report_config_warnings(&config);

    run(&args, &config)
        .inspect_err(|e| tracing::error!("{e:#}"))
        .map(|_| ExitCode::SUCCESS)
        .or_else(|_| Ok(ExitCode::FAILURE))
}

fn config_error(e: &anyhow::Error) -> ExitCode {
    eprintln!("{ERROR}ERROR{ERROR:#} {e:#}");
    eprintln!("{INFO}Hint:{INFO:#} `acape --show-config` shows where each setting came from");
    ExitCode::FAILURE
}

/// Logs each configuration warning; returns how many there were
fn report_config_warnings(config: &Configuration) -> usize {
    let warnings = config.warnings();
    for w in &warnings {
        warn!("{w}");
    }
    warnings.len()
}

/// Installs the SIGTERM handler, then spawns a task which cancels the token on SIGINT or SIGTERM.
///
/// If either signal cannot be watched, that is logged and the other is still honoured.
/// The task ends when the token is cancelled.
fn spawn_signal_watcher(cancel: CancellationToken) -> JoinHandle<()> {
    let term = signal(SignalKind::terminate())
        .inspect_err(|e| warn!("cannot watch for SIGTERM: {e}"))
        .ok();
    tokio::spawn(watch_signals(term, cancel))
}

async fn watch_signals(term: Option<Signal>, cancel: CancellationToken) {
    let sigterm = async move {
        if let Some(mut term) = term {
            if term.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await;
    };
    let sigint = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot watch for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        () = sigint => info!("interrupted"),
        () = sigterm => info!("terminated"),
        () = cancel.cancelled() => return,
    }
    info!("shutdown requested");
    cancel.cancel();
}

#[tokio::main(flavor = "current_thread")]
async fn run(args: &CliArgs, config: &Configuration) -> anyhow::Result<RunSummary> {
    info!(
        "acape {} starting: {}",
        env!("ACAPE_VERSION_STRING"),
        config.format_control_config()
    );
    if config.iterations > 0 {
        debug!("will stop after {} iterations", config.iterations);
    }

    let cancel = CancellationToken::new();
    let watcher = spawn_signal_watcher(cancel.clone());

    let source = TcStatistics::new(&config.tc, Some(config.qdisc.as_str()));
    let summary = if args.dry_run {
        warn!("dry run: the queueing discipline will not be changed");
        control(config, source, DryRunActuator::default(), cancel.clone()).await
    } else {
        let sudo = config.privilege.use_sudo();
        if sudo {
            debug!("reconfiguration will use sudo");
        }
        let actuator = TcActuator::new(&config.tc, &config.qdisc, sudo);
        control(config, source, actuator, cancel.clone()).await
    };

    cancel.cancel();
    if let Err(e) = watcher.await {
        warn!("signal watcher panicked: {e}");
    }
    Ok(summary)
}

async fn control<A: Actuator>(
    config: &Configuration,
    source: TcStatistics,
    actuator: A,
    cancel: CancellationToken,
) -> RunSummary {
    let policy = ThresholdPolicy::new(config.threshold);
    let mut controller = Controller::new(
        &config.interface,
        source,
        actuator,
        policy,
        config.targets(),
    )
    .with_interval(config.interval())
    .with_call_timeout(config.timeout())
    .with_iteration_limit(config.iteration_limit())
    .with_state(ControllerState::new(config.sync_on_start));
    controller.run(cancel).await
}

#[cfg(test)]
mod test {
    use std::{
        io::Write,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use nix::{
        sys::signal::{kill, Signal},
        unistd::Pid,
    };
    use tokio_util::sync::CancellationToken;

    use super::{report_config_warnings, spawn_signal_watcher};
    use crate::{config::Configuration, util::HumanDuration};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn config_warnings_reach_the_log() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let config = Configuration {
            normal_target: HumanDuration::from_millis(2),
            congested_target: HumanDuration::from_millis(4),
            ..Default::default()
        };
        let n =
            tracing::subscriber::with_default(subscriber, || report_config_warnings(&config));
        assert_eq!(n, 1);
        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"), "{output}");
        assert!(
            output.contains("congested target 4ms is not tighter than normal target 2ms"),
            "{output}"
        );
    }

    #[tokio::test]
    async fn watcher_ends_when_cancelled() {
        let cancel = CancellationToken::new();
        let jh = spawn_signal_watcher(cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), jh)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn sigterm_cancels() {
        let cancel = CancellationToken::new();
        // the SIGTERM handler is installed before this returns
        let jh = spawn_signal_watcher(cancel.clone());
        kill(Pid::this(), Signal::SIGTERM).unwrap();
        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .unwrap();
        jh.await.unwrap();
    }
}
